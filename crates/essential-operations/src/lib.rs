//! Essential Operations - Built-in operations for blueprint graphs
//!
//! The [`EssentialsExtension`] is submitted via `inventory`, so
//! `OperationRegistry::register_builtins()` picks it up whenever this crate is
//! linked. It contributes:
//!
//! - `essentials/letter-number-cipher`: letters to alphabet positions and back
//! - `essentials/word-counter`: character, word and line counts of a text

use async_trait::async_trait;
use operation_engine::{ActivationError, ContributionExport, Extension, ExtensionContext, ExtensionFn};

pub mod choices;
pub mod letter_number_cipher;
mod text;
pub mod word_counter;

/// Identifier of the extension and namespace of its operation names
pub const EXTENSION_ID: &str = "essentials";

/// The built-in essentials extension
#[derive(Debug, Clone, Copy, Default)]
pub struct EssentialsExtension;

impl EssentialsExtension {
    /// Boxed constructor used for link-time registration
    pub fn boxed() -> Box<dyn Extension> {
        Box::new(Self)
    }
}

#[async_trait]
impl Extension for EssentialsExtension {
    fn id(&self) -> &str {
        EXTENSION_ID
    }

    async fn activate(
        &self,
        _context: &ExtensionContext,
    ) -> Result<Vec<ContributionExport>, ActivationError> {
        log::debug!("Activating '{}' operations", EXTENSION_ID);
        Ok(vec![letter_number_cipher::export(), word_counter::export()])
    }
}

inventory::submit!(ExtensionFn(EssentialsExtension::boxed));
