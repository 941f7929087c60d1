// data_preparator.rs
// 数据准备器：把像素坐标 (row, col) 仿射映射到复平面坐标 (x, y)。
use crate::config::Viewport;

#[derive(Debug, Clone)]
pub struct DataPreparator {
    pub width: usize,
    pub height: usize,
    pub viewport: Viewport,
}

impl DataPreparator {
    pub fn new(width: usize, height: usize, viewport: Viewport) -> Self {
        Self {
            width,
            height,
            viewport,
        }
    }

    /// x = x_min + (x_max - x_min) * col / width
    #[inline]
    pub fn real(&self, col: usize) -> f64 {
        let v = &self.viewport;
        v.x_min + (v.x_max - v.x_min) * col as f64 / self.width as f64
    }

    /// y = y_min + (y_max - y_min) * row / height
    #[inline]
    pub fn imag(&self, row: usize) -> f64 {
        let v = &self.viewport;
        v.y_min + (v.y_max - v.y_min) * row as f64 / self.height as f64
    }

    pub fn point(&self, row: usize, col: usize) -> (f64, f64) {
        (self.real(col), self.imag(row))
    }

    /// 每一列的实部，worker 在扫描前计算一次，逐行复用
    pub fn column_reals(&self) -> Vec<f64> {
        (0..self.width).map(|col| self.real(col)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corners() {
        let prep = DataPreparator::new(4, 2, Viewport::default());
        assert_eq!(prep.point(0, 0), (-2.5, -1.0));
        // 右下角不包含 x_max / y_max
        let (x, y) = prep.point(1, 3);
        assert!((x - (-2.5 + 3.5 * 3.0 / 4.0)).abs() < 1e-12);
        assert!((y - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_column_reals_match_point() {
        let prep = DataPreparator::new(37, 11, Viewport::default());
        let reals = prep.column_reals();
        assert_eq!(reals.len(), 37);
        for (col, re) in reals.iter().enumerate() {
            assert_eq!(*re, prep.point(5, col).0);
        }
    }
}
