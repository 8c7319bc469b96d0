pub struct DefaultsConfig {
    pub trajectory: String,
    pub title: String,
    pub timestep_fs: f64,
    pub temperature: f64,
    pub friction: f64,
    pub integrator: String,
    pub constraints: String,
    pub frames: usize,
    pub steps_per_frame: u64,
    pub initial_frame: bool,
    pub embedding_method: String,
    pub embedding_cutoff_nm: f64,
    pub neighbour_list_frequency: u64,
    pub device: String,
    pub server_startup_wait_secs: f64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            trajectory: "trajectory.dcd".to_string(),
            title: "mlmm trajectory".to_string(),
            timestep_fs: 1.0,
            temperature: 300.0,
            friction: 1.0,
            integrator: "langevin-middle".to_string(),
            constraints: "none".to_string(),
            frames: 300,
            steps_per_frame: 100,
            initial_frame: false,
            embedding_method: "electrostatic".to_string(),
            embedding_cutoff_nm: 0.75,
            neighbour_list_frequency: 20,
            device: "cpu".to_string(),
            server_startup_wait_secs: 2.0,
        }
    }
}
