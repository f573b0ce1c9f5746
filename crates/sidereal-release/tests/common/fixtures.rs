//! Test fixtures for release integration tests.

use std::collections::BTreeMap;

use sidereal_release::{App, Config, ConfigId, ProcessType, Slug, SlugId};

/// An application with the given name.
pub fn app(name: &str) -> App {
    App::new(name)
}

/// A configuration snapshot with one variable.
pub fn config(id: &str) -> Config {
    Config {
        id: ConfigId::new(id),
        vars: BTreeMap::from([("RUST_LOG".to_owned(), "info".to_owned())]),
    }
}

/// A slug declaring the given `(process type, command)` pairs.
pub fn slug(id: &str, types: &[(&str, &str)]) -> Slug {
    Slug {
        id: SlugId::new(id),
        image: format!("registry.local/acme:{id}"),
        process_types: types
            .iter()
            .map(|(name, cmd)| (ProcessType::new(*name), (*cmd).to_owned()))
            .collect(),
    }
}

/// Process type helper.
pub fn pt(name: &str) -> ProcessType {
    ProcessType::new(name)
}
