use serde::Serialize;

/// Model information.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct Model {
    pub(crate) id: String,
    pub(crate) object: String,
    pub(crate) owned_by: String,
}

/// Models list response.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ModelsResponse {
    pub(crate) object: String,
    pub(crate) data: Vec<Model>,
}
