pub mod api;
pub mod core;

pub use crate::api::models::pit_stop::{Completeness, IntervalReport, PitStopReport};
pub use crate::api::video::{analyze_dir, measure_stationary_time_in_dir, PitStopTimer};
pub use crate::core::config::AnalysisConfig;
pub use crate::core::error::{PitStopError, Result};

pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("pit_lib_rust"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        // 重复调用时 try_init 返回 Err，忽略即可
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .is_test(cfg!(test))
            .try_init();
    }
}
