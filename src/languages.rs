//! Language registry
//!
//! A closed set of supported languages, each carrying a static execution
//! profile: isolation image, source extension, run command, and an optional
//! dependency-install template. Unknown identifiers fail at parse time
//! instead of surfacing as missing map entries.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Supported programming languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Bash,
    Go,
}

impl Language {
    /// All registered languages
    pub fn all() -> &'static [Language] {
        &[
            Language::Python,
            Language::JavaScript,
            Language::TypeScript,
            Language::Bash,
            Language::Go,
        ]
    }

    /// Execution profile for this language
    pub fn profile(&self) -> LanguageProfile {
        match self {
            Language::Python => LanguageProfile {
                language: *self,
                image: "python:3.12-slim",
                extension: "py",
                run_command: &["python3", "main.py"],
                install_template: Some("pip install --no-cache-dir"),
            },
            Language::JavaScript => LanguageProfile {
                language: *self,
                image: "node:22-slim",
                extension: "js",
                run_command: &["node", "main.js"],
                install_template: Some("npm install --no-save"),
            },
            Language::TypeScript => LanguageProfile {
                language: *self,
                image: "denoland/deno:alpine",
                extension: "ts",
                run_command: &["deno", "run", "--allow-read=.", "main.ts"],
                install_template: None,
            },
            Language::Bash => LanguageProfile {
                language: *self,
                image: "bash:5",
                extension: "sh",
                run_command: &["bash", "main.sh"],
                install_template: None,
            },
            Language::Go => LanguageProfile {
                language: *self,
                image: "golang:1.23-alpine",
                extension: "go",
                run_command: &["go", "run", "main.go"],
                install_template: None,
            },
        }
    }
}

impl std::str::FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            "typescript" | "ts" => Ok(Language::TypeScript),
            "bash" | "sh" | "shell" => Ok(Language::Bash),
            "go" | "golang" => Ok(Language::Go),
            _ => Err(Error::UnsupportedLanguage(s.to_string())),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::Python => write!(f, "python"),
            Language::JavaScript => write!(f, "javascript"),
            Language::TypeScript => write!(f, "typescript"),
            Language::Bash => write!(f, "bash"),
            Language::Go => write!(f, "go"),
        }
    }
}

/// Execution profile for a language
#[derive(Debug, Clone, Copy)]
pub struct LanguageProfile {
    /// The language this profile belongs to
    pub language: Language,
    /// Container image providing the language runtime
    pub image: &'static str,
    /// Source file extension (without the dot)
    pub extension: &'static str,
    /// Run command tokens; the last token is the source file name
    pub run_command: &'static [&'static str],
    /// Install command prefix, completed with package names
    install_template: Option<&'static str>,
}

impl LanguageProfile {
    /// Shell command installing the given packages, if this language
    /// defines an installer
    pub fn install_command(&self, dependencies: &[String]) -> Option<String> {
        if dependencies.is_empty() {
            return None;
        }
        self.install_template
            .map(|prefix| format!("{} {}", prefix, dependencies.join(" ")))
    }

    /// Run command as a shell line
    pub fn run_line(&self) -> String {
        self.run_command.join(" ")
    }
}
