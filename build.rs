use std::env;

fn main() {
    println!("cargo:rerun-if-changed=Info.plist");

    // CoreBluetooth only lets a process scan when its binary carries an
    // Info.plist with NSBluetoothAlwaysUsageDescription.  A plain CLI has no
    // bundle, so the plist is linked into the __TEXT,__info_plist section.
    // CARGO_CFG_TARGET_OS is the target, so cross builds get it too.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("macos") {
        return;
    }
    let Ok(dir) = env::var("CARGO_MANIFEST_DIR") else {
        println!("cargo:warning=CARGO_MANIFEST_DIR unset; LinkBand scanning will be refused on macOS");
        return;
    };
    for arg in ["-sectcreate", "__TEXT", "__info_plist"] {
        println!("cargo:rustc-link-arg-bins={arg}");
    }
    println!("cargo:rustc-link-arg-bins={dir}/Info.plist");
}
