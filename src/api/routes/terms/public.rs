//! Public types for the terms API
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct TermsStatus {
    pub accepted: bool,
}
