// With the default feature set this build script is a no-op: the crate
// compiles the checked-in `src/gen.rs`. Building with `--features generate`
// regenerates `src/gen.rs` in place from `proto/octf.proto`, the same way a
// developer refreshes it after editing the schema; the result is committed
// like any other source change, not produced on every build.
#[cfg(feature = "generate")]
fn main() {
    let out_dir = std::path::PathBuf::from(std::env::var("OUT_DIR").unwrap());

    prost_build::Config::new()
        .compile_well_known_types()
        .out_dir(&out_dir)
        .compile_protos(&["proto/octf.proto"], &["proto/"])
        .expect("octf.proto compiles");

    pbjson_build::Builder::new()
        .register_descriptors(&std::fs::read(out_dir.join("octf.bin")).unwrap_or_default())
        .build(&[".octf"])
        .expect("pbjson mapping compiles");

    let generated = std::fs::read_to_string(out_dir.join("octf.rs")).expect("prost wrote octf.rs");
    std::fs::write("src/gen.rs", generated).expect("src/gen.rs is writable");
}

#[cfg(not(feature = "generate"))]
fn main() {}
