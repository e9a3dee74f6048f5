//! Domain layer: caller-facing template representations and transforms.

pub mod template;
