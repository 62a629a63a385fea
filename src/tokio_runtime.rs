//! The single cooperative execution context
//!
//! All session, cursor and render state lives on one current-thread Tokio
//! runtime. PipeWire main loops run on their own threads and only talk to
//! it through channels; decode work goes to the blocking pool.

use tokio::runtime::{Builder, Runtime};

/// Build the runtime the controller runs on
pub fn build() -> std::io::Result<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .thread_name("murmur-blocking")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_runs_blocking_work() {
        let runtime = build().unwrap();
        let value = runtime.block_on(async {
            tokio::task::spawn_blocking(|| 21 * 2).await.unwrap()
        });
        assert_eq!(value, 42);
    }
}
