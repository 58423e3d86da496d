use decomp_engine::JobService;

/// Shared state handed to every route handler.
pub struct AppState {
    pub jobs: JobService,
}

impl AppState {
    pub fn new(jobs: JobService) -> Self {
        Self { jobs }
    }

    /// Stops the job service once no handler holds the state anymore.
    pub async fn shutdown(self) {
        self.jobs.shutdown().await;
    }
}
