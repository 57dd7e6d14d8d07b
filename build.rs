// 构建脚本: 静态链接 FFmpeg 时补充 Windows 系统库
fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    #[cfg(all(target_os = "windows", target_env = "msvc"))]
    {
        // libmfx: QSV, libx264: 编码器, oleaut32/vfw32: dshow 摄像头, secur32: RTSP over TLS
        for lib in ["libmfx", "libx264", "oleaut32", "vfw32", "secur32"] {
            println!("cargo:rustc-link-lib=dylib={}", lib);
        }
    }
}
