fn main() {
    // Setup cfg aliases
    cfg_aliases::cfg_aliases! {
        // Platforms
        macos: { target_os = "macos" },
        ios: { target_os = "ios" },
        android: { target_os = "android" },
        // Backends
        wgl: { windows },
        glx: { all(unix, not(any(macos, ios, android))) },
        cgl: { macos },
        unsupported: { not(any(wgl, glx, cgl)) },
    }

    println!("cargo:rerun-if-changed=build.rs");
}
