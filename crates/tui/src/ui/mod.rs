//! UI layer of the run console: terminal runtime, frame rendering and theming.

pub mod runtime;
pub mod theme;
pub mod view;
