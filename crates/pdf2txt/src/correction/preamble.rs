use regex::Regex;

use crate::error::ConfigError;

/// Removes one leading introductory phrase ("Voici le texte corrigé :") that
/// models emit despite being told not to.
#[derive(Debug, Clone)]
pub struct PreambleStripper {
    patterns: Vec<Regex>,
}

impl PreambleStripper {
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                Regex::new(&format!(r"(?i)^\s*(?:{})\s*", pattern)).map_err(|e| {
                    ConfigError::InvalidPattern {
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Strips the first matching preamble, then surrounding whitespace.
    pub fn strip(&self, output: &str) -> String {
        for pattern in &self.patterns {
            if let Some(found) = pattern.find(output) {
                return output[found.end()..].trim().to_string();
            }
        }
        output.trim().to_string()
    }
}
