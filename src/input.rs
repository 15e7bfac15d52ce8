use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::Entity;

#[derive(Debug, Deserialize)]
struct Export {
    data: ExportData,
}

#[derive(Debug, Deserialize)]
struct ExportData {
    applications: Vec<Entity>,
}

pub fn load_entities(path: &Path) -> Result<Vec<Entity>> {
    let file = File::open(path).with_context(|| format!("opening games file {}", path.display()))?;
    parse_entities(BufReader::new(file)).with_context(|| format!("decoding games file {}", path.display()))
}

pub fn parse_entities(reader: impl Read) -> Result<Vec<Entity>> {
    let export: Export = serde_json::from_reader(reader)?;
    Ok(export
        .data
        .applications
        .into_iter()
        .map(|e| Entity::new(e.name, e.logo))
        .collect())
}
