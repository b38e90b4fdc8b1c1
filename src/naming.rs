/// Deterministic mapping from a project identifier to its collection name.
pub fn collection_name(project_id: &str) -> String {
    format!("collection_{}", project_id.trim())
}
