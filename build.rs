use std::process::Command;

/// Set environment varibles for build.rs
/// set_env!(NAME=xfy);
macro_rules! set_env {
    ($($tokens: tt)*) => {
        println!("cargo:rustc-env={}", format!($($tokens)*))
    };
}

fn main() {
    rustc_info();
}

/// 导出编译器版本，启动时打印
fn rustc_info() {
    let compiler = Command::new("rustc")
        .args(["-vV"])
        .output()
        .ok()
        .map(|output| String::from_utf8_lossy(&output.stdout).into_owned())
        .and_then(|info| info.lines().find(|line| !line.is_empty()).map(str::to_owned))
        .unwrap_or_else(|| "rustc unknown".to_string());

    set_env!("PRECACHE_COMPILER={}", compiler);
    println!("cargo:rerun-if-changed=build.rs");
}
