//! Skills
//!
//! Markdown instruction files that extend the system prompt. A skill file
//! starts with YAML frontmatter:
//!
//! ```text
//! ---
//! name: haiku
//! description: Answer in haiku form
//! ---
//!
//! Reply with three lines of 5, 7 and 5 syllables.
//! ```
//!
//! Skills are read from `<dir>/*.md` and `<dir>/*/SKILL.md`.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::RuntimeError;

/// A loaded skill
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Skill {
    pub name: String,
    pub description: String,
    /// Markdown body after the frontmatter
    pub instructions: String,
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct Frontmatter {
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Result of scanning a skills directory
#[derive(Debug, Default)]
pub struct LoadedSkills {
    pub skills: Vec<Skill>,
    /// Files that were skipped, with the reason
    pub diagnostics: Vec<RuntimeError>,
}

/// Parse one skill file's content
pub fn parse_skill(path: &Path, content: &str) -> Result<Skill, RuntimeError> {
    let fail = |reason: &str| RuntimeError::Skill(path.to_path_buf(), reason.to_string());

    let content = content.trim_start_matches('\u{feff}').trim();
    let rest = content
        .strip_prefix("---")
        .ok_or_else(|| fail("missing YAML frontmatter"))?;
    let end = rest
        .find("\n---")
        .ok_or_else(|| fail("unterminated frontmatter"))?;

    let frontmatter: Frontmatter = serde_yaml::from_str(&rest[..end])
        .map_err(|e| fail(&format!("invalid frontmatter: {e}")))?;
    let name = frontmatter
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| fail("frontmatter has no name"))?;

    Ok(Skill {
        name,
        description: frontmatter.description.unwrap_or_default(),
        instructions: rest[end + 4..].trim().to_string(),
        path: path.to_path_buf(),
    })
}

fn skill_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            let nested = path.join("SKILL.md");
            if nested.is_file() {
                files.push(nested);
            }
        } else if path.extension().is_some_and(|ext| ext == "md") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load every skill under `dir`. A missing directory yields nothing; bad
/// files are reported in [`LoadedSkills::diagnostics`] and skipped.
pub fn load_skills_from_dir(dir: &Path) -> LoadedSkills {
    let mut loaded = LoadedSkills::default();
    if !dir.is_dir() {
        tracing::debug!(dir = %dir.display(), "No skills directory");
        return loaded;
    }

    let files = match skill_files(dir) {
        Ok(files) => files,
        Err(e) => {
            loaded
                .diagnostics
                .push(RuntimeError::Skill(dir.to_path_buf(), e.to_string()));
            return loaded;
        }
    };

    for path in files {
        let parsed = fs::read_to_string(&path)
            .map_err(|e| RuntimeError::Skill(path.clone(), e.to_string()))
            .and_then(|content| parse_skill(&path, &content));
        match parsed {
            Ok(skill) => loaded.skills.push(skill),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping skill");
                loaded.diagnostics.push(e);
            }
        }
    }
    loaded
}

/// System prompt assembly
pub struct SystemPrompt;

impl SystemPrompt {
    /// `base` followed by an "Available skills" section when there are any
    pub fn compose(base: &str, skills: &[Skill]) -> String {
        let mut prompt = base.trim_end().to_string();
        if skills.is_empty() {
            return prompt;
        }

        prompt.push_str("\n\n## Available Skills\n");
        for skill in skills {
            let _ = write!(prompt, "\n### {}\n", skill.name);
            if !skill.description.is_empty() {
                let _ = writeln!(prompt, "{}", skill.description);
            }
            if !skill.instructions.is_empty() {
                let _ = write!(prompt, "\n{}\n", skill.instructions);
            }
        }
        prompt
    }
}
