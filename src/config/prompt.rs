use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use log::{ info, warn };

pub const DEFAULT_INSTRUCTION: &str = "You are a helpful assistant.";

/// Best-effort language guess. This is a trigger-word lookup, not language detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    French,
    Spanish,
    German,
    Default,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::French => "fr",
            Language::Spanish => "es",
            Language::German => "de",
            Language::Default => "default",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "fr" => Some(Language::French),
            "es" => Some(Language::Spanish),
            "de" => Some(Language::German),
            "default" | "en" => Some(Language::Default),
            _ => None,
        }
    }
}

/// Trigger substrings, checked in order. Matching is case-sensitive.
const TRIGGER_WORDS: &[(&str, Language, &str)] = &[
    ("Bonjour", Language::French, "Vous êtes un assistant utile."),
    ("Hola", Language::Spanish, "Eres un asistente útil."),
    ("Hallo", Language::German, "Sie sind ein hilfreicher Assistent."),
];

pub fn guess_language(text: &str) -> Language {
    TRIGGER_WORDS
        .iter()
        .find(|(trigger, _, _)| text.contains(trigger))
        .map(|(_, language, _)| *language)
        .unwrap_or(Language::Default)
}

#[derive(Debug)]
pub enum PromptError {
    UnknownLanguage(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::UnknownLanguage(code) => write!(f, "Unknown instruction language '{}'", code),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

#[derive(Deserialize, Debug, Default)]
struct PromptFile {
    #[serde(default)]
    instructions: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub language: Language,
    pub text: String,
}

/// System instruction per language, seeded from the built-in table.
#[derive(Debug, Clone)]
pub struct PromptConfig {
    instructions: HashMap<Language, String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        let mut instructions: HashMap<Language, String> = TRIGGER_WORDS
            .iter()
            .map(|(_, language, text)| (*language, text.to_string()))
            .collect();
        instructions.insert(Language::Default, DEFAULT_INSTRUCTION.to_string());
        Self { instructions }
    }
}

impl PromptConfig {
    pub fn instruction_for(&self, language: Language) -> &str {
        self.instructions
            .get(&language)
            .or_else(|| self.instructions.get(&Language::Default))
            .map(|s| s.as_str())
            .unwrap_or(DEFAULT_INSTRUCTION)
    }

    pub fn select(&self, latest_user_text: &str) -> Instruction {
        let language = guess_language(latest_user_text);
        Instruction {
            language,
            text: self.instruction_for(language).to_string(),
        }
    }

    fn apply_overrides(&mut self, overrides: HashMap<String, String>) -> Result<(), PromptError> {
        for (code, text) in overrides {
            let language = Language::from_code(&code).ok_or(PromptError::UnknownLanguage(code))?;
            if text.trim().is_empty() {
                warn!("Ignoring empty instruction override for '{}'", language.code());
                continue;
            }
            self.instructions.insert(language, text);
        }
        Ok(())
    }
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<PromptConfig, Box<dyn Error + Send + Sync>> {
    let path = path.as_ref();
    let file_content = fs
        ::read_to_string(path)
        .map_err(|e| format!("Failed to read prompts file '{}': {}", path.display(), e))?;
    let config = parse_prompts(&file_content)
        .map_err(|e| format!("Failed to parse prompts file '{}': {}", path.display(), e))?;
    info!("Loaded instruction overrides from {}", path.display());
    Ok(config)
}

pub fn parse_prompts(raw: &str) -> Result<PromptConfig, PromptError> {
    let file: PromptFile = serde_json::from_str(raw)?;
    let mut config = PromptConfig::default();
    config.apply_overrides(file.instructions)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn trigger_words_pick_language() {
        assert_eq!(guess_language("Bonjour, ça va?"), Language::French);
        assert_eq!(guess_language("Hola"), Language::Spanish);
        assert_eq!(guess_language("Hallo"), Language::German);
        assert_eq!(guess_language("Hello there"), Language::Default);
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(guess_language("bonjour"), Language::Default);
    }

    #[test]
    fn first_trigger_in_table_order_wins() {
        assert_eq!(guess_language("Hallo und Hola"), Language::Spanish);
    }

    #[test]
    fn default_config_selects_localized_text() {
        let config = PromptConfig::default();
        assert_eq!(config.select("Bonjour, ça va?").text, "Vous êtes un assistant utile.");
        assert_eq!(config.select("Hola").text, "Eres un asistente útil.");
        assert_eq!(config.select("Hallo").text, "Sie sind ein hilfreicher Assistent.");
        assert_eq!(config.select("Where is my order?").text, DEFAULT_INSTRUCTION);
    }

    #[test]
    fn overrides_replace_only_named_languages() {
        let config = parse_prompts(
            r#"{"instructions": {"default": "You are the Headstarter support assistant."}}"#
        ).unwrap();
        assert_eq!(config.instruction_for(Language::Default), "You are the Headstarter support assistant.");
        assert_eq!(config.instruction_for(Language::German), "Sie sind ein hilfreicher Assistent.");
    }

    #[test]
    fn unknown_language_code_is_an_error() {
        let err = parse_prompts(r#"{"instructions": {"it": "Sei un assistente."}}"#).unwrap_err();
        assert!(matches!(err, PromptError::UnknownLanguage(code) if code == "it"));
    }

    #[test]
    fn load_prompts_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"instructions": {{"fr": "Vous êtes le support."}}}}"#).unwrap();
        let config = load_prompts(file.path()).unwrap();
        assert_eq!(config.instruction_for(Language::French), "Vous êtes le support.");
    }

    #[test]
    fn load_prompts_reports_missing_file() {
        let err = load_prompts("/nonexistent/prompts.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read prompts file"));
    }
}
