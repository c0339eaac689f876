/// Parameters carried by one job invocation (the trigger surface).
///
/// Contract with the caller: when `use_progress` is set, jobs ignore the
/// explicit `city` and consult the progress cursor instead.
#[derive(Debug, Clone, Default)]
pub struct JobParams {
    pub city: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub categories: Option<Vec<String>>,
    /// Object-store key of the input dataset for two-stage pipelines.
    pub input_ref: Option<String>,
    pub limit: Option<u32>,
    pub use_progress: bool,
    pub label: String,
}

/// Parse a pipe- or comma-delimited list. Pipe wins when both appear, so
/// keywords containing commas can still be expressed.
pub fn parse_delimited_list(raw: &str) -> Option<Vec<String>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let parts: Vec<String> = if s.contains('|') {
        s.split('|').map(|p| p.trim().to_string()).collect()
    } else if s.contains(',') {
        s.split(',').map(|p| p.trim().to_string()).collect()
    } else {
        vec![s.to_string()]
    };
    let parts: Vec<String> = parts.into_iter().filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}
