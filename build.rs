use vergen_gix::{BuildBuilder, Emitter, GixBuilder, RustcBuilder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only the fields printed by `karmafarm-seed version` are emitted.
    let build = BuildBuilder::default().build_timestamp(true).build()?;
    let git = GixBuilder::default().sha(true).build()?;
    let rustc = RustcBuilder::default().semver(true).build()?;

    Emitter::default()
        .add_instructions(&build)?
        .add_instructions(&git)?
        .add_instructions(&rustc)?
        .emit()?;

    Ok(())
}
