pub mod analysis_task;
pub mod chapter;
pub mod chapter_fact;
pub mod entity_dict;
pub mod novel;
pub mod user_state;
pub mod world_structure;

pub use analysis_task::{AnalysisTask, TaskStatus};
pub use chapter::Chapter;
pub use chapter_fact::{
    CharacterFact, ChapterFact, ConceptFact, EventFact, ItemEventFact, LocationFact,
    OrgEventFact, RelationshipFact,
};
pub use entity_dict::{Confidence, EntityDictEntry, EntityType};
pub use novel::Novel;
pub use user_state::{PrescanStatus, UserState};
pub use world_structure::{ParentVote, WorldStructure, WorldStructureOverride};
