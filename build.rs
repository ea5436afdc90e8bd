//! Build script for Keylatch
//!
//! Embeds the Windows application manifest (per-monitor DPI awareness)

fn main() {
    #[cfg(windows)]
    {
        embed_resource::compile("resources/keylatch.rc", embed_resource::NONE);
    }

    println!("cargo:rerun-if-changed=resources/keylatch.rc");
    println!("cargo:rerun-if-changed=resources/keylatch.manifest");
}
