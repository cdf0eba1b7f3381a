//! Prompt loader: workspace overrides first, then built-ins.

use crate::defaults::{builtin_ids, builtin_prompt};
use crate::types::PromptDefinition;
use agri_core::config::STATE_DIR;
use agri_core::{AppError, AppResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(STATE_DIR).join("prompts")
}

/// Load a prompt definition by ID.
///
/// A file named `<id>.yml` in `.agri/prompts/` takes precedence over the
/// built-in definition of the same ID.
///
/// # Example
/// ```no_run
/// use agri_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "answer.synthesize")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    if prompt_file.exists() {
        tracing::debug!("Loading prompt override from: {:?}", prompt_file);

        let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to read prompt file {:?}: {}",
                prompt_file, e
            ))
        })?;

        let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to parse prompt YAML {:?}: {}",
                prompt_file, e
            ))
        })?;

        validate_prompt(&definition)?;

        if definition.id != prompt_id {
            tracing::warn!(
                "Prompt file {:?} declares id {}, expected {}",
                prompt_file,
                definition.id,
                prompt_id
            );
        }

        tracing::info!("Loaded prompt override: {} ({})", definition.id, definition.title);
        return Ok(definition);
    }

    builtin_prompt(prompt_id)?
        .ok_or_else(|| AppError::Prompt(format!("Prompt not found: {}", prompt_id)))
}

/// List all available prompt IDs: built-ins plus workspace files.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let mut prompt_ids: Vec<String> = builtin_ids().iter().map(|s| s.to_string()).collect();
    let dir = prompts_dir(workspace_path);

    if dir.exists() {
        for entry in walkdir::WalkDir::new(&dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    prompt_ids.push(stem.to_string());
                }
            }
        }
    }

    prompt_ids.sort();
    prompt_ids.dedup();
    Ok(prompt_ids)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}

/// The set of prompts a pipeline instance uses, resolved once at startup.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    prompts: HashMap<String, PromptDefinition>,
}

impl PromptLibrary {
    /// Built-in prompts only.
    pub fn builtin() -> AppResult<Self> {
        let mut prompts = HashMap::new();
        for id in builtin_ids() {
            if let Some(def) = builtin_prompt(id)? {
                prompts.insert(id.to_string(), def);
            }
        }
        Ok(Self { prompts })
    }

    /// Built-in prompts with workspace overrides applied.
    pub fn load(workspace_path: &Path) -> AppResult<Self> {
        let mut prompts = HashMap::new();
        for id in builtin_ids() {
            prompts.insert(id.to_string(), load_prompt(workspace_path, id)?);
        }
        Ok(Self { prompts })
    }

    /// Get a prompt by ID.
    pub fn get(&self, prompt_id: &str) -> AppResult<&PromptDefinition> {
        self.prompts
            .get(prompt_id)
            .ok_or_else(|| AppError::Prompt(format!("Prompt not found: {}", prompt_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::{ANSWER_SYNTHESIZE, INTENT_CLASSIFY};
    use std::fs;
    use tempfile::TempDir;

    fn write_override(dir: &Path, id: &str, content: &str) -> PathBuf {
        let dir = prompts_dir(dir);
        fs::create_dir_all(&dir).unwrap();
        let file_path = dir.join(format!("{}.yml", id));
        fs::write(&file_path, content).unwrap();
        file_path
    }

    #[test]
    fn test_load_builtin_without_workspace_files() {
        let temp_dir = TempDir::new().unwrap();
        let prompt = load_prompt(temp_dir.path(), ANSWER_SYNTHESIZE).unwrap();
        assert_eq!(prompt.id, ANSWER_SYNTHESIZE);
    }

    #[test]
    fn test_workspace_override_wins() {
        let temp_dir = TempDir::new().unwrap();
        write_override(
            temp_dir.path(),
            INTENT_CLASSIFY,
            r#"
id: intent.classify
title: "Custom classifier"
apiVersion: "1.1"
template: "Farming? {{question}}"
"#,
        );

        let prompt = load_prompt(temp_dir.path(), INTENT_CLASSIFY).unwrap();
        assert_eq!(prompt.title, "Custom classifier");
        assert_eq!(prompt.template, "Farming? {{question}}");
    }

    #[test]
    fn test_load_nonexistent_prompt() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_prompt(temp_dir.path(), "nonexistent").is_err());
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        write_override(temp_dir.path(), "broken", "invalid: yaml: content:");
        assert!(load_prompt(temp_dir.path(), "broken").is_err());
    }

    #[test]
    fn test_invalid_api_version_rejected() {
        let temp_dir = TempDir::new().unwrap();
        write_override(
            temp_dir.path(),
            "custom",
            "id: custom\ntitle: x\napiVersion: \"1\"\ntemplate: \"{{question}}\"\n",
        );
        assert!(matches!(
            load_prompt(temp_dir.path(), "custom"),
            Err(AppError::Prompt(_))
        ));
    }

    #[test]
    fn test_list_prompts_merges_builtins() {
        let temp_dir = TempDir::new().unwrap();
        write_override(
            temp_dir.path(),
            "extra.prompt",
            "id: extra.prompt\ntitle: x\napiVersion: \"1.0\"\ntemplate: t\n",
        );
        write_override(
            temp_dir.path(),
            ANSWER_SYNTHESIZE,
            "id: answer.synthesize\ntitle: x\napiVersion: \"1.0\"\ntemplate: t\n",
        );

        let prompts = list_prompts(temp_dir.path()).unwrap();
        assert_eq!(prompts.len(), 4);
        assert!(prompts.contains(&"extra.prompt".to_string()));
    }

    #[test]
    fn test_library_builtin() {
        let library = PromptLibrary::builtin().unwrap();
        assert!(library.get(ANSWER_SYNTHESIZE).is_ok());
        assert!(library.get("missing").is_err());
    }
}
