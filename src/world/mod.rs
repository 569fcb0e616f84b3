//! Spatial-hierarchy construction: turns raw location mentions scattered
//! across chapters into one consistent world tree, plus the supporting
//! analyses (scene transitions, macro skeleton, genre/layer classification)
//! that feed it.

pub mod geo;
pub mod hierarchy_consolidator;
pub mod hierarchy_reviewer;
pub mod macro_skeleton_generator;
pub mod scene_transition_analyzer;
pub mod tier;
pub mod world_structure_agent;

pub use hierarchy_consolidator::{HierarchyConsolidator, HierarchyInput, HierarchyOutput};
pub use hierarchy_reviewer::{Correction, HierarchyReviewer};
pub use tier::Tier;
pub use world_structure_agent::{Genre, WorldStructureAgent};
