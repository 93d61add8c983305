mod platform;

fn main() -> anyhow::Result<()> {
    let code = platform::run_app()?;
    std::process::exit(code);
}
