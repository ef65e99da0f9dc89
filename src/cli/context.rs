//! Context management commands

use anyhow::{Context as _, Result};
use std::path::Path;

use crate::store::{ChatStore, Context, NewContext};

pub fn add(
    store: &ChatStore,
    name: String,
    content: Option<String>,
    file: Option<String>,
) -> Result<()> {
    let content = read_content(content, file)?.unwrap_or_default();
    let id = store.add_context(&NewContext::new(name.trim(), content))?;
    println!("Context '{}' created with ID: {}", name.trim(), id);
    Ok(())
}

pub fn list(store: &ChatStore) -> Result<()> {
    let contexts = store.get_contexts()?;
    if contexts.is_empty() {
        println!("No contexts found. Add one with 'toolbar-chat context add <name>'.");
        return Ok(());
    }

    println!("{:<6} {:<20} {:<17} {}", "ID", "Name", "Updated", "Content");
    println!("{}", "-".repeat(85));
    for c in contexts {
        println!(
            "{:<6} {:<20} {:<17} {}",
            c.id,
            super::truncate(&c.name, 20),
            c.updated_at.format("%Y-%m-%d %H:%M"),
            super::truncate(&c.content, 40)
        );
    }
    Ok(())
}

pub fn show(store: &ChatStore, name: &str) -> Result<()> {
    let context = find(store, name)?;
    println!("Name:    {}", context.name);
    println!("ID:      {}", context.id);
    println!("Created: {}", context.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Updated: {}", context.updated_at.format("%Y-%m-%d %H:%M:%S"));
    println!("{}", "-".repeat(40));
    println!("{}", context.content);
    Ok(())
}

pub fn edit(
    store: &ChatStore,
    name: &str,
    content: Option<String>,
    file: Option<String>,
) -> Result<()> {
    let content = read_content(content, file)?
        .ok_or_else(|| anyhow::anyhow!("Provide the new content with --content or --file"))?;

    let mut context = find(store, name)?;
    context.touch(content);
    if !store.update_context(&context)? {
        anyhow::bail!("Context '{}' was removed before it could be saved", context.name);
    }
    println!("Saved context '{}'", context.name);
    Ok(())
}

pub fn delete(store: &ChatStore, name: &str) -> Result<()> {
    let context = find(store, name)?;
    store.delete_context(context.id)?;
    println!("Deleted context '{}'", context.name);
    Ok(())
}

fn find(store: &ChatStore, name: &str) -> Result<Context> {
    store
        .find_context_by_name(name.trim())?
        .ok_or_else(|| anyhow::anyhow!("Context not found: {}", name))
}

fn read_content(content: Option<String>, file: Option<String>) -> Result<Option<String>> {
    match (content, file) {
        (Some(_), Some(_)) => anyhow::bail!("Use either --content or --file, not both"),
        (Some(text), None) => Ok(Some(text)),
        (None, Some(path)) => {
            let path = shellexpand::tilde(&path).to_string();
            let text = std::fs::read_to_string(Path::new(&path))
                .with_context(|| format!("Failed to read context file {}", path))?;
            Ok(Some(text))
        }
        (None, None) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_edit_delete_roundtrip() {
        let store = ChatStore::open_in_memory().unwrap();
        add(&store, " work ".to_string(), Some("Be terse".to_string()), None).unwrap();

        let created = store.find_context_by_name("work").unwrap().unwrap();
        assert_eq!(created.content, "Be terse");

        edit(&store, "work", Some("Be thorough".to_string()), None).unwrap();
        let edited = store.find_context_by_name("work").unwrap().unwrap();
        assert_eq!(edited.content, "Be thorough");
        assert_eq!(edited.created_at, created.created_at);
        assert!(edited.updated_at >= created.updated_at);

        delete(&store, "work").unwrap();
        assert!(store.get_contexts().unwrap().is_empty());
        assert!(delete(&store, "work").is_err());
    }

    #[test]
    fn test_add_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.md");
        std::fs::write(&path, "You review Rust code.").unwrap();

        let store = ChatStore::open_in_memory().unwrap();
        add(
            &store,
            "review".to_string(),
            None,
            Some(path.to_string_lossy().to_string()),
        )
        .unwrap();

        let context = store.find_context_by_name("review").unwrap().unwrap();
        assert_eq!(context.content, "You review Rust code.");
    }

    #[test]
    fn test_edit_requires_content() {
        let store = ChatStore::open_in_memory().unwrap();
        add(&store, "work".to_string(), None, None).unwrap();
        assert!(edit(&store, "work", None, None).is_err());
        assert!(read_content(Some("a".to_string()), Some("b".to_string())).is_err());
    }
}
