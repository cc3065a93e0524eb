#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)] // if we add new fields, give them default values when deserializing old configs
pub struct SchedulerConfig {
    pub worker_threads: usize,
    pub thread_name_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 1,
            thread_name_prefix: "pledge-worker".to_string(),
        }
    }
}
