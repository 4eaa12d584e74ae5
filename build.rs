use std::env;
use std::path::PathBuf;

// Only the `libav` feature links FFmpeg; the default build shells out to the
// `ffmpeg` executable and needs nothing at compile time.
fn main() {
    println!("cargo:rerun-if-env-changed=FFMPEG_DIR");
    println!("cargo:rerun-if-env-changed=VCPKG_ROOT");
    println!("cargo:rerun-if-env-changed=VCPKGRS_TRIPLET");

    if env::var_os("CARGO_FEATURE_LIBAV").is_none() {
        return;
    }
    if env::var("CARGO_CFG_TARGET_OS").unwrap_or_default() != "windows" {
        return;
    }
    if env::var_os("FFMPEG_DIR").is_some() {
        return;
    }

    let Ok(vcpkg_root) = env::var("VCPKG_ROOT") else {
        println!(
            "cargo:warning=the libav feature needs FFmpeg development libraries; set FFMPEG_DIR or VCPKG_ROOT."
        );
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let ffmpeg_dir = PathBuf::from(&vcpkg_root).join("installed").join(&triplet);
    if ffmpeg_dir.exists() {
        println!(
            "cargo:warning=using vcpkg FFmpeg at {}; set FFMPEG_DIR to silence this.",
            ffmpeg_dir.display()
        );
    } else {
        println!(
            "cargo:warning=VCPKG_ROOT is set but {} does not exist.",
            ffmpeg_dir.display()
        );
    }
}
