//! Launch-time tuning knobs

/// Options controlling how the dispatcher instantiates kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Allow 64-bit index arithmetic for tensors beyond `i32::MAX` elements
    pub allow_int64: bool,
    /// Replace index divisions by magic-number multiplies where legal
    pub use_fast_div: bool,
    /// Use the fixed window/stride direct kernels where the shape matches
    pub static_direct: bool,
    /// Process several channels or features per work item where divisible
    pub vectorise: bool,
    /// Largest Winograd transform domain (`A * B`) that is still vectorised
    pub winograd_vector_limit: usize,
    /// Batch positions per filter element above which the direct filter
    /// gradient switches to the work-group reduction kernel
    pub reduction_threshold: usize,
    /// Work-group size of the reduction kernel; a power of two
    pub workgroup_size: usize,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            allow_int64: cfg!(feature = "int64"),
            use_fast_div: true,
            static_direct: true,
            vectorise: true,
            winograd_vector_limit: 16,
            reduction_threshold: 4096,
            workgroup_size: 64,
        }
    }
}
