
#[cfg(all(target_os="windows", target_arch="x86_64", feature="kernel"))]
pub mod windows;

#[cfg(all(target_os="windows", target_arch="x86_64", feature="kernel"))]
pub use windows::NtKernel;
