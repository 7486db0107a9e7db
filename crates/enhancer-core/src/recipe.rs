use std::collections::HashSet;
use std::path::{Component, Path};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::modification::Modification;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipeFile {
    pub path: String,
    #[serde(default)]
    pub modifications: Vec<Modification>,
}

/// A named set of modification lists, one per target file, read from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recipe {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub files: Vec<RecipeFile>,
}

impl Recipe {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let recipe: Self = toml::from_str(input).context("failed to parse enhancer recipe")?;
        validate_recipe_name(&recipe.name)?;
        if recipe.files.is_empty() {
            return Err(anyhow!("recipe '{}' does not modify any file", recipe.name));
        }

        let mut seen_paths = HashSet::new();
        for file in &recipe.files {
            validate_recipe_path(&file.path)
                .with_context(|| format!("invalid file path in recipe '{}'", recipe.name))?;
            if !seen_paths.insert(file.path.as_str()) {
                return Err(anyhow!(
                    "duplicate file '{}' in recipe '{}': merge its modifications into one list",
                    file.path,
                    recipe.name
                ));
            }
            if file.modifications.is_empty() {
                return Err(anyhow!(
                    "file '{}' in recipe '{}' has no modifications",
                    file.path,
                    recipe.name
                ));
            }
        }
        Ok(recipe)
    }
}

fn validate_recipe_name(name: &str) -> anyhow::Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("recipe name must not be empty"));
    }
    if trimmed
        .chars()
        .any(|ch| !(ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'))
    {
        return Err(anyhow!("recipe name contains invalid character(s): {name}"));
    }
    Ok(())
}

fn validate_recipe_path(path: &str) -> anyhow::Result<()> {
    if path.trim().is_empty() {
        return Err(anyhow!("file path must not be empty"));
    }

    let candidate = Path::new(path);
    if candidate.is_absolute() || path.starts_with('/') || path.starts_with('\\') {
        return Err(anyhow!("file path must be relative: {path}"));
    }
    if candidate
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
    {
        return Err(anyhow!("file path must stay inside the source tree: {path}"));
    }
    Ok(())
}
