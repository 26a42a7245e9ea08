//! First-run setup: prompt for token and patterns, write the config, keep it out of git

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use colored::*;
use eyre::{Context, Result};
use rustyline::DefaultEditor;
use tracing::{debug, info};

use crate::config::{CONFIG_FILE, Config};
use crate::git::find_git_root;

/// Answers collected from the operator; empty keeps the current value
#[derive(Debug, Clone, Default)]
pub struct InitAnswers {
    pub token: String,
    pub patterns: String,
}

/// Merge answers into an existing config
pub fn apply_answers(mut config: Config, answers: &InitAnswers) -> Config {
    let token = answers.token.trim();
    if !token.is_empty() {
        config.project_token = token.to_string();
    }
    let patterns = answers.patterns.trim();
    if !patterns.is_empty() {
        config.patterns = patterns.to_string();
    }
    config
}

fn token_prompt(config: &Config) -> String {
    if config.project_token.is_empty() {
        "Your project token [from RV HappyHour]: ".to_string()
    } else {
        format!("Your project token [{}]: ", config.project_token)
    }
}

fn patterns_prompt(config: &Config) -> String {
    if config.patterns.is_empty() {
        "Watch patterns [e.g.: **/*.rb app/javascript/**/*.js]: ".to_string()
    } else {
        format!("Watch patterns [{}]: ", config.patterns)
    }
}

/// Run interactive setup and write the config file
pub fn run_init(config_path: Option<&PathBuf>) -> Result<()> {
    let path = Config::path(config_path);
    debug!(?path, "run_init: called");

    // An unreadable or malformed file is treated as empty
    let existing = if path.exists() {
        Config::load_from_file(&path).unwrap_or_default()
    } else {
        Config::default()
    };

    let mut editor = DefaultEditor::new().context("Failed to open terminal for prompts")?;
    let answers = InitAnswers {
        token: editor.readline(&token_prompt(&existing)).context("Failed to read project token")?,
        patterns: editor.readline(&patterns_prompt(&existing)).context("Failed to read watch patterns")?,
    };

    let config = apply_answers(existing, &answers);
    config.save(&path).context("Failed to write configuration")?;
    println!("{} Wrote {}", "✓".green(), path.display().to_string().cyan());

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let ignore_dir = find_git_root(&dir.join(CONFIG_FILE))
        .map(|root| root.path().to_path_buf())
        .unwrap_or(dir);

    let entry = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| CONFIG_FILE.to_string());
    if ensure_gitignored(&ignore_dir, &entry)? {
        println!("{} Added {} to .gitignore", "✓".green(), entry.cyan());
    }

    Ok(())
}

/// Append `entry` to an existing `.gitignore` in `dir` unless already listed
///
/// Returns whether the file was changed. A missing `.gitignore` is left alone.
pub fn ensure_gitignored(dir: &Path, entry: &str) -> Result<bool> {
    let gitignore = dir.join(".gitignore");
    if !gitignore.exists() {
        debug!(?gitignore, "ensure_gitignored: no .gitignore");
        return Ok(false);
    }

    let content = fs::read_to_string(&gitignore).context("Failed to read .gitignore")?;
    let listed = content.lines().map(str::trim).any(|line| {
        let line = line.trim_start_matches('/');
        line == entry
    });
    if listed {
        return Ok(false);
    }

    let mut file = fs::OpenOptions::new()
        .append(true)
        .open(&gitignore)
        .context("Failed to open .gitignore")?;
    if !content.is_empty() && !content.ends_with('\n') {
        writeln!(file)?;
    }
    writeln!(file, "{}", entry)?;
    info!(?gitignore, entry, "Added config to .gitignore");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_answers_keep_current_values() {
        let current = Config {
            project_token: "old".to_string(),
            patterns: "**/*.rb".to_string(),
            ..Default::default()
        };
        let updated = apply_answers(current, &InitAnswers::default());
        assert_eq!(updated.project_token, "old");
        assert_eq!(updated.patterns, "**/*.rb");
    }

    #[test]
    fn test_answers_replace_values() {
        let answers = InitAnswers {
            token: " new-token ".to_string(),
            patterns: "**/*.ts".to_string(),
        };
        let updated = apply_answers(Config::default(), &answers);
        assert_eq!(updated.project_token, "new-token");
        assert_eq!(updated.patterns, "**/*.ts");
    }

    #[test]
    fn test_prompts_show_current_or_example() {
        let config = Config::default();
        assert!(patterns_prompt(&config).contains("e.g."));

        let config = Config {
            project_token: "abc".to_string(),
            ..Default::default()
        };
        assert_eq!(token_prompt(&config), "Your project token [abc]: ");
    }

    #[test]
    fn test_ensure_gitignored_appends_once() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(".gitignore"), "target").unwrap();

        assert!(ensure_gitignored(temp.path(), CONFIG_FILE).unwrap());
        assert!(!ensure_gitignored(temp.path(), CONFIG_FILE).unwrap());

        let content = fs::read_to_string(temp.path().join(".gitignore")).unwrap();
        assert_eq!(content, "target\n.happyhour\n");
    }

    #[test]
    fn test_ensure_gitignored_respects_rooted_entry() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(".gitignore"), "/.happyhour\n").unwrap();
        assert!(!ensure_gitignored(temp.path(), CONFIG_FILE).unwrap());
    }

    #[test]
    fn test_ensure_gitignored_without_file() {
        let temp = TempDir::new().unwrap();
        assert!(!ensure_gitignored(temp.path(), CONFIG_FILE).unwrap());
        assert!(!temp.path().join(".gitignore").exists());
    }
}
