use once_cell::sync::Lazy;
use regex::Regex;

static SECRET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"(?i)(password|passwd|access[_-]?token|id[_-]?token|token|secret)\s*[:=]\s*["']?([^\s"',;]{1,})["']?"#)
            .expect("valid regex"),
        Regex::new(r"(?i)\b(bearer)\s+([A-Za-z0-9_\-\.=]{8,})").expect("valid regex"),
        Regex::new(r"\b(eyJ[A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]*)").expect("valid regex"),
    ]
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionResult {
    pub content: String,
    pub redaction_count: usize,
}

#[derive(Debug, Default, Clone)]
pub struct Redactor {
    known_secrets: Vec<String>,
}

impl Redactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, secret: &str) -> Self {
        if secret.len() >= 4 {
            self.known_secrets.push(secret.to_string());
        }
        self
    }

    pub fn redact(&self, input: &str) -> RedactionResult {
        if input.is_empty() {
            return RedactionResult {
                content: String::new(),
                redaction_count: 0,
            };
        }

        let mut result = input.to_string();
        let mut redaction_count = 0usize;

        for secret in &self.known_secrets {
            let matches = result.matches(secret.as_str()).count();
            if matches > 0 {
                redaction_count += matches;
                result = result.replace(secret.as_str(), "[REDACTED]");
            }
        }

        for pattern in SECRET_PATTERNS.iter() {
            let matches = pattern.find_iter(&result).count();
            if matches == 0 {
                continue;
            }

            redaction_count += matches;
            result = pattern
                .replace_all(&result, |caps: &regex::Captures<'_>| {
                    match caps.get(2) {
                        Some(_) => {
                            let key = caps
                                .get(1)
                                .map(|m| m.as_str())
                                .unwrap_or("secret")
                                .to_ascii_lowercase();
                            format!("{}=[REDACTED]", key)
                        }
                        None => "[REDACTED_JWT]".to_string(),
                    }
                })
                .to_string();
        }

        RedactionResult {
            content: result,
            redaction_count,
        }
    }
}
