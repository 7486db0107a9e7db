mod engine;
mod modification;
mod recipe;

pub use engine::{
    apply_modification, apply_modifications, apply_to_text, MissingReference, PatchError,
    PatchOutcome, TextPatch,
};
pub use modification::{InsertMode, Modification, Reference};
pub use recipe::{Recipe, RecipeFile};
