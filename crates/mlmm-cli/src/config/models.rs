use mlmm::workflows::simulate::SimulationConfig;

pub struct AppConfig {
    pub core_config: SimulationConfig,
    /// Source of the configuration, for the run banner.
    pub config_path: std::path::PathBuf,
}
