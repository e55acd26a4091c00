#[cfg(feature = "anthropic")]
pub mod client;
pub mod prompts;
pub mod types;
pub mod utils;

#[cfg(feature = "anthropic")]
pub use client::*;
pub use prompts::{
    build_expand_prompt, build_gap_prompt, build_new_crop_prompt, CropSeed, EXPANSION_SECTIONS,
};
pub use types::*;
pub use utils::*;
