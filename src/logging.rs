use tracing_subscriber::EnvFilter;

/// 初始化日志。`RUST_LOG` 可覆盖默认级别，日志输出到 stderr，
/// stdout 留给命令结果。重复调用不会出错。
pub fn init(verbose: bool) {
    let default_level = if verbose { "mistake_notebook=debug" } else { "mistake_notebook=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_does_not_panic() {
        init(false);
        init(true);
    }
}
