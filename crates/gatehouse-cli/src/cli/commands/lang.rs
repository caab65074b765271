//! Language preference handlers.

use anyhow::Result;
use gatehouse_core::FileStore;
use gatehouse_core::language::{load_preference, resolve_language, store_preference};
use gatehouse_types::LanguageCode;

pub fn show() {
    let store = FileStore::open_default();
    let language = resolve_language(&store);
    let source = if load_preference(&store).is_some() {
        "saved"
    } else {
        "device"
    };
    println!("{} ({}, {source})", language.native_name(), language.as_str());
}

pub fn set(value: &str) -> Result<()> {
    let language: LanguageCode = value.parse().map_err(anyhow::Error::msg)?;
    let store = FileStore::open_default();
    store_preference(&store, language)?;
    println!("Language set to {}", language.native_name());
    Ok(())
}
