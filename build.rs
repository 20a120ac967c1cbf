// build.rs

fn main() -> anyhow::Result<()> {
    // ESP-IDF link args, firmware target only
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }

    build_data::set_BUILD_TIMESTAMP();
    build_data::no_debug_rebuilds().map_err(anyhow::Error::msg)?;
    Ok(())
}
// EOF
