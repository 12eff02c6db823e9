use crate::SafetyViolation;
use regex::{Regex, RegexBuilder};

/// Forbidden capability categories and the patterns that reveal them.
const RULES: &[(&str, &[&str])] = &[
    (
        "process",
        &[r"\bsubprocess\b", r"\bos\.system\b", r"\bos\.popen\b"],
    ),
    (
        "file",
        &[
            r"\bopen\s*\(",
            r"\bshutil\b",
            r"\bpathlib\b",
            r"\bos\.(remove|unlink|rmdir|makedirs|mkdir)\b",
        ],
    ),
    (
        "network",
        &[
            r"\burllib\b",
            r"\brequests\b",
            r"\bsocket\b",
            r"\bhttp\.client\b",
        ],
    ),
    ("environment", &[r"\bos\.environ\b", r"\bgetenv\b"]),
    (
        "dynamic",
        &[
            r"__import__",
            r"\bimportlib\b",
            r"\beval\s*\(",
            r"\bexec\s*\(",
            r"\bcompile\s*\(",
        ],
    ),
];

struct CompiledRule {
    category: &'static str,
    pattern: Regex,
}

/// Case-insensitive textual blocklist run on a script before execution.
pub struct SafetyGate {
    rules: Vec<CompiledRule>,
}

impl SafetyGate {
    pub fn new() -> Result<Self, regex::Error> {
        let rules = RULES
            .iter()
            .flat_map(|(category, patterns)| patterns.iter().map(move |p| (*category, *p)))
            .map(|(category, pattern)| {
                Ok(CompiledRule {
                    category,
                    pattern: RegexBuilder::new(pattern).case_insensitive(true).build()?,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }

    /// Reject `source` on the first forbidden pattern it contains.
    pub fn check(&self, source: &str) -> Result<(), SafetyViolation> {
        for rule in &self.rules {
            if let Some(found) = rule.pattern.find(source) {
                return Err(SafetyViolation {
                    category: rule.category,
                    matched: found.as_str().to_string(),
                });
            }
        }
        Ok(())
    }
}
