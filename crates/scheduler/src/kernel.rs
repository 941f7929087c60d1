// kernel.rs
// 逐单元格的逃逸时间核函数接口，以及经典 Mandelbrot 实现。

/// 逃逸时间核函数：纯函数、确定性、必然终止。
/// 返回值必须落在 [0, max_iterations] 内。
pub trait EscapeKernel: Send + Sync {
    fn escape_time(&self, re: f64, im: f64, max_iterations: u32) -> u32;
}

/// z <- z^2 + c，|z| > 2 视为逃逸
#[derive(Debug, Clone, Copy, Default)]
pub struct Mandelbrot;

impl EscapeKernel for Mandelbrot {
    #[inline]
    fn escape_time(&self, re: f64, im: f64, max_iterations: u32) -> u32 {
        let (mut zr, mut zi) = (0.0f64, 0.0f64);
        for n in 0..max_iterations {
            // |z|^2 > 4 等价于 |z| > 2
            if zr * zr + zi * zi > 4.0 {
                return n;
            }
            let next_r = zr * zr - zi * zi + re;
            zi = 2.0 * zr * zi + im;
            zr = next_r;
        }
        max_iterations
    }
}

/// 任意闭包也可以作为核函数使用
impl<F> EscapeKernel for F
where
    F: Fn(f64, f64, u32) -> u32 + Send + Sync,
{
    fn escape_time(&self, re: f64, im: f64, max_iterations: u32) -> u32 {
        self(re, im, max_iterations)
    }
}
