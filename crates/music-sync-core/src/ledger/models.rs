/// One attempt at one version (path + mtime) of a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingRecord {
    pub id: i64,
    pub original_path: String,
    pub mtime: i64,
    pub content_hash: Option<String>,
    pub result: String,
    pub logged_at: String,
}

/// Aggregate view of the operation log.
#[derive(Debug, Clone, Default)]
pub struct LedgerSummary {
    pub ingested_hashes: i64,
    pub processing_records: i64,
    /// (result tag, count), most frequent first.
    pub by_result: Vec<(String, i64)>,
}
