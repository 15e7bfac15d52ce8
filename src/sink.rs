use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tokio::sync::Mutex;

use crate::model::{Entity, Resolution};

const HEADER: &str = r#"<!DOCTYPE html><html lang="en"><head><style>
body{display:flex;flex-wrap:wrap;background:moccasin}div{margin:5px;padding:5px;border:blue 1px solid;text-align:center}
img{width:300px;padding-top:5px}</style><meta charset="utf-8"><title>My Games</title></head><body>
"#;
const TRAILER: &str = "</body></html>";

/// The result page. Blocks land in completion order; every write goes
/// through one lock.
pub struct HtmlSink<W: Write + Send> {
    writer: Mutex<BufWriter<W>>,
}

impl HtmlSink<File> {
    pub fn create(path: &Path) -> io::Result<Self> {
        Self::new(File::create(path)?)
    }
}

impl<W: Write + Send> HtmlSink<W> {
    pub fn new(inner: W) -> io::Result<Self> {
        let mut writer = BufWriter::new(inner);
        writer.write_all(HEADER.as_bytes())?;
        Ok(Self {
            writer: Mutex::new(writer),
        })
    }

    /// Writes the block for a resolution. Returns whether anything was written.
    pub async fn write(&self, entity: &Entity, resolution: &Resolution) -> io::Result<bool> {
        let block = match resolution {
            Resolution::Resolved { url, text } => format!(
                "<div><a href=\"{}\">{}</a><br/><img src=\"{}\"></div>\n",
                escape(url),
                escape(text),
                escape(&entity.logo)
            ),
            Resolution::ResolvedNoLink { text } => format!(
                "<div><span>{}</span><br/><img src=\"{}\"></div>\n",
                escape(text),
                escape(&entity.logo)
            ),
            Resolution::Skipped | Resolution::Failed { .. } => return Ok(false),
        };
        let mut w = self.writer.lock().await;
        w.write_all(block.as_bytes())?;
        Ok(true)
    }

    pub async fn finish(&self) -> io::Result<()> {
        let mut w = self.writer.lock().await;
        w.write_all(TRAILER.as_bytes())?;
        w.flush()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().into_inner().map_err(|e| e.into_error())
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn render(entity: &Entity, resolution: &Resolution) -> String {
        let sink = HtmlSink::new(Vec::new()).unwrap();
        sink.write(entity, resolution).await.unwrap();
        sink.finish().await.unwrap();
        String::from_utf8(sink.into_inner().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn linked_block() {
        let entity = Entity::new("Foo Bar", "https://cdn/foo.png");
        let html = render(
            &entity,
            &Resolution::Resolved {
                url: "https://store/en-US/p/foo-bar".to_string(),
                text: "Foo Bar".to_string(),
            },
        )
        .await;
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains(
            "<div><a href=\"https://store/en-US/p/foo-bar\">Foo Bar</a><br/><img src=\"https://cdn/foo.png\"></div>\n"
        ));
        assert!(html.ends_with("</body></html>"));
    }

    #[tokio::test]
    async fn unlinked_block_is_escaped() {
        let entity = Entity::new("Tom & Jerry <3", "x");
        let html = render(
            &entity,
            &Resolution::ResolvedNoLink {
                text: entity.name.clone(),
            },
        )
        .await;
        assert!(html.contains("<div><span>Tom &amp; Jerry &lt;3</span><br/><img src=\"x\"></div>"));
    }

    #[tokio::test]
    async fn skipped_and_failed_write_nothing() {
        let sink = HtmlSink::new(Vec::new()).unwrap();
        let entity = Entity::new("Foo", "x");
        assert!(!sink.write(&entity, &Resolution::Skipped).await.unwrap());
        assert!(!sink
            .write(&entity, &Resolution::Failed { reason: "nope".to_string() })
            .await
            .unwrap());
        sink.finish().await.unwrap();
        let html = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert!(!html.contains("<div>"));
    }
}
