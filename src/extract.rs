//! Fixed-path navigation over an element tree.
//!
//! A path is a list of `(tag, index)` steps; each step moves to the first
//! child of the current node, then `index - 1` siblings further, and checks
//! the tag found there. Any mismatch means the markup drifted.

use scraper::ElementRef;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("step {step}: expected <{expected}> but {}", describe(.actual))]
    StructureMismatch {
        step: usize,
        expected: &'static str,
        actual: Option<String>,
    },
}

fn describe(actual: &Option<String>) -> String {
    match actual {
        Some(tag) => format!("found <{tag}>"),
        None => "no such child".to_string(),
    }
}

pub trait TreeNode: Sized {
    fn first_child(&self) -> Option<Self>;
    fn next_sibling(&self) -> Option<Self>;
    fn tag(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub tag: &'static str,
    pub index: usize,
}

pub const fn step(tag: &'static str, index: usize) -> Step {
    Step { tag, index }
}

pub fn descend<N: TreeNode>(node: &N, path: &[Step]) -> Result<N, ExtractError> {
    let mut current: Option<N> = None;
    for (i, s) in path.iter().enumerate() {
        let parent = current.as_ref().unwrap_or(node);
        let mismatch = |actual| ExtractError::StructureMismatch { step: i, expected: s.tag, actual };

        let mut child = parent.first_child().ok_or_else(|| mismatch(None))?;
        for _ in 1..s.index {
            child = child.next_sibling().ok_or_else(|| mismatch(None))?;
        }
        if !child.tag().eq_ignore_ascii_case(s.tag) {
            return Err(mismatch(Some(child.tag().to_string())));
        }
        current = Some(child);
    }
    current.ok_or(ExtractError::StructureMismatch {
        step: 0,
        expected: "",
        actual: None,
    })
}

// Element-only view: text and comment nodes between tags are not counted.
impl<'a> TreeNode for ElementRef<'a> {
    fn first_child(&self) -> Option<Self> {
        self.children().find_map(ElementRef::wrap)
    }

    fn next_sibling(&self) -> Option<Self> {
        self.next_siblings().find_map(ElementRef::wrap)
    }

    fn tag(&self) -> &str {
        self.value().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    const PATH: [Step; 3] = [step("div", 1), step("div", 1), step("a", 1)];

    fn first_li(html: &Html) -> ElementRef<'_> {
        html.select(&Selector::parse("li").unwrap()).next().unwrap()
    }

    #[test]
    fn follows_the_path() {
        let html = Html::parse_fragment(
            r#"<ul><li> <div><div>
                <a href="/p/foo" aria-label="x, Foo, y">Foo</a><span></span>
            </div></div></li></ul>"#,
        );
        let anchor = descend(&first_li(&html), &PATH).unwrap();
        assert_eq!(anchor.value().attr("href"), Some("/p/foo"));
    }

    #[test]
    fn index_walks_siblings() {
        let html = Html::parse_fragment("<ul><li><span></span><p></p><em>hit</em></li></ul>");
        let em = descend(&first_li(&html), &[step("em", 3)]).unwrap();
        assert_eq!(em.inner_html(), "hit");
    }

    #[test]
    fn wrong_tag_names_the_step() {
        let html = Html::parse_fragment("<ul><li><div><span><a></a></span></div></li></ul>");
        let err = descend(&first_li(&html), &PATH).unwrap_err();
        assert_eq!(
            err,
            ExtractError::StructureMismatch {
                step: 1,
                expected: "div",
                actual: Some("span".to_string()),
            }
        );
        assert_eq!(err.to_string(), "step 1: expected <div> but found <span>");
    }

    #[test]
    fn missing_child_is_a_mismatch() {
        let html = Html::parse_fragment("<ul><li><div></div></li></ul>");
        let err = descend(&first_li(&html), &PATH).unwrap_err();
        assert!(matches!(err, ExtractError::StructureMismatch { step: 1, actual: None, .. }));

        let html = Html::parse_fragment("<ul><li><p></p></li></ul>");
        let err = descend(&first_li(&html), &[step("p", 2)]).unwrap_err();
        assert!(matches!(err, ExtractError::StructureMismatch { step: 0, actual: None, .. }));
    }
}
