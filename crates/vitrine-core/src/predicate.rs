//! Configurable inclusion predicates over normalized records.
//!
//! A predicate is a boolean tree of keyword-membership and pattern tests.
//! Evaluation is case-insensitive and whitespace-normalized.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::CrawlError;
use crate::models::Record;
use crate::normalize::fold;

/// Which part of a record a test looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    #[default]
    Description,
    Url,
    /// Description and URL joined by a space.
    Text,
}

/// Inclusion predicate as written in a target file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    All {
        of: Vec<Predicate>,
    },
    Any {
        of: Vec<Predicate>,
    },
    Not {
        of: Box<Predicate>,
    },
    /// True if the subject contains at least one of the terms.
    Contains {
        #[serde(default)]
        field: Subject,
        terms: Vec<String>,
    },
    /// True if the regular expression matches anywhere in the subject.
    Matches {
        #[serde(default)]
        field: Subject,
        pattern: String,
    },
}

impl Predicate {
    fn contains(terms: &[&str]) -> Predicate {
        Predicate::Contains {
            field: Subject::Description,
            terms: terms.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn matches(pattern: &str) -> Predicate {
        Predicate::Matches {
            field: Subject::Description,
            pattern: pattern.to_string(),
        }
    }

    /// Heuristic for wine-like product titles: a vintage year, a grape
    /// variety, a producer word, a strong indicator, or a parenthetical.
    pub fn wine_like() -> Predicate {
        Predicate::Any {
            of: vec![
                Predicate::matches(r"\b20\d{2}\b"),
                Predicate::contains(&[
                    "cabernet",
                    "chardonnay",
                    "merlot",
                    "pinot",
                    "sauvignon",
                    "zinfandel",
                    "syrah",
                    "malbec",
                    "blanc",
                    "noir",
                    "red",
                    "white",
                    "rosé",
                    "rose",
                    "shiraz",
                    "grenache",
                ]),
                Predicate::contains(&[
                    "vineyard", "winery", "cellars", "estate", "chateau", "domaine", "bodega",
                ]),
                Predicate::contains(&[
                    "cuvée",
                    "cuvee",
                    "reserve",
                    "grand cru",
                    "premier cru",
                    "brut",
                    "vintage",
                    "tinto",
                    "vinho",
                    "wine",
                ]),
                Predicate::matches(r"\([^)]+\)"),
            ],
        }
    }

    /// Validate patterns and fold terms once.
    pub fn compile(&self) -> Result<CompiledPredicate, CrawlError> {
        Ok(CompiledPredicate {
            root: Node::compile(self)?,
        })
    }
}

#[derive(Debug, Clone)]
enum Node {
    All(Vec<Node>),
    Any(Vec<Node>),
    Not(Box<Node>),
    Contains(Subject, Vec<String>),
    Matches(Subject, Regex),
}

impl Node {
    fn compile(predicate: &Predicate) -> Result<Node, CrawlError> {
        let compile_all =
            |of: &[Predicate]| of.iter().map(Node::compile).collect::<Result<Vec<_>, _>>();
        Ok(match predicate {
            Predicate::All { of } => Node::All(compile_all(of)?),
            Predicate::Any { of } => Node::Any(compile_all(of)?),
            Predicate::Not { of } => Node::Not(Box::new(Node::compile(of)?)),
            Predicate::Contains { field, terms } => {
                let terms: Vec<String> = terms
                    .iter()
                    .map(|t| fold(t))
                    .filter(|t| !t.is_empty())
                    .collect();
                if terms.is_empty() {
                    return Err(CrawlError::Config("'contains' needs at least one term".into()));
                }
                Node::Contains(*field, terms)
            }
            Predicate::Matches { field, pattern } => {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| CrawlError::Config(format!("Invalid pattern '{pattern}': {e}")))?;
                Node::Matches(*field, regex)
            }
        })
    }

    fn eval(&self, subjects: &Subjects) -> bool {
        match self {
            Node::All(of) => of.iter().all(|n| n.eval(subjects)),
            Node::Any(of) => of.iter().any(|n| n.eval(subjects)),
            Node::Not(of) => !of.eval(subjects),
            Node::Contains(field, terms) => {
                let text = subjects.get(*field);
                terms.iter().any(|t| text.contains(t.as_str()))
            }
            Node::Matches(field, regex) => regex.is_match(subjects.get(*field)),
        }
    }
}

struct Subjects {
    description: String,
    url: String,
    text: String,
}

impl Subjects {
    fn get(&self, subject: Subject) -> &str {
        match subject {
            Subject::Description => &self.description,
            Subject::Url => &self.url,
            Subject::Text => &self.text,
        }
    }
}

/// A predicate ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledPredicate {
    root: Node,
}

impl CompiledPredicate {
    pub fn accepts(&self, record: &Record) -> bool {
        self.accepts_text(&record.description, &record.url)
    }

    pub fn accepts_text(&self, description: &str, url: &str) -> bool {
        let description = fold(description);
        let url = fold(url);
        let text = format!("{description} {url}");
        self.root.eval(&Subjects {
            description,
            url,
            text,
        })
    }
}
