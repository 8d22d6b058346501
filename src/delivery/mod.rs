pub mod orchestrator;
pub mod report;

pub use orchestrator::{DeliveryOptions, DeliveryOrchestrator};
pub use report::{
    Announcement, Attachment, AttachmentBatch, AttachmentOutcome, DeliveredRef, DeliveryReport,
};
