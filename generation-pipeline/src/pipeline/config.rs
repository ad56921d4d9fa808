use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GenerationTuning {
    pub cutout_timeout: Duration,
    pub rewrite_timeout: Duration,
    pub render_timeout: Duration,
    pub scoring_timeout: Duration,
    pub compose_timeout: Duration,
    pub download_timeout: Duration,
    pub scoring_concurrency: usize,
    pub max_retries: u32,
    pub fallback_width: u32,
    pub fallback_height: u32,
}

impl Default for GenerationTuning {
    fn default() -> Self {
        Self {
            cutout_timeout: Duration::from_secs(60),
            rewrite_timeout: Duration::from_secs(45),
            render_timeout: Duration::from_secs(10 * 60),
            scoring_timeout: Duration::from_secs(90),
            compose_timeout: Duration::from_secs(120),
            download_timeout: Duration::from_secs(120),
            scoring_concurrency: 4,
            max_retries: 1,
            fallback_width: 1080,
            fallback_height: 1920,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerationConfig {
    pub tuning: GenerationTuning,
}
