fn main() {
    use vergen::{BuildBuilder, CargoBuilder, Emitter};

    // Build timestamp and target triple are logged at startup under -vv.
    let mut emitter = Emitter::default();

    if let Ok(build) = BuildBuilder::default().build_timestamp(true).build() {
        let _ = emitter.add_instructions(&build);
    }
    if let Ok(cargo) = CargoBuilder::default().target_triple(true).build() {
        let _ = emitter.add_instructions(&cargo);
    }

    if let Err(e) = emitter.emit() {
        eprintln!("vergen emit skipped: {e}");
    }
}
