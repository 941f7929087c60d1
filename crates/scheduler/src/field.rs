// field.rs
// 输出网格：按行存储的逃逸时间值；以及共享内存模式下切给各 worker 独占写入的行块。
use crate::error::{Error, Result};
use crate::types::Partition;
use crate::task_splitter::verify_coverage;

/// 完成后的输出网格，行主序存储
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscapeField {
    width: usize,
    height: usize,
    cells: Vec<u32>,
}

impl EscapeField {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![0; width * height],
        }
    }

    /// 按顺序拼接各分区的行块，块必须恰好覆盖整个网格
    pub fn from_row_blocks(width: usize, height: usize, blocks: Vec<(Partition, Vec<u32>)>) -> Result<Self> {
        let mut blocks = blocks;
        blocks.sort_by_key(|(p, _)| p.start_row);

        let mut cells = Vec::with_capacity(width * height);
        let mut next_row = 0;
        for (partition, block) in blocks {
            if partition.start_row != next_row {
                return Err(Error::InsufficientData(format!(
                    "行块从第 {} 行开始，期望第 {} 行",
                    partition.start_row, next_row
                )));
            }
            if block.len() != partition.cell_count(width) {
                return Err(Error::InsufficientData(format!(
                    "worker {} 的行块大小 {} 与分区大小 {} 不一致",
                    partition.worker_id,
                    block.len(),
                    partition.cell_count(width)
                )));
            }
            cells.extend_from_slice(&block);
            next_row = partition.end_row;
        }
        if next_row != height {
            return Err(Error::InsufficientData(format!(
                "行块只覆盖到第 {} 行，网格共有 {} 行",
                next_row, height
            )));
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, row: usize, col: usize) -> Option<u32> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.cells.get(row * self.width + col).copied()
    }

    pub fn row(&self, row: usize) -> &[u32] {
        let start = row * self.width;
        &self.cells[start..start + self.width]
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.cells
    }

    /// 按分区把网格切成互不相交的行块。分区必须按行序恰好覆盖整个网格。
    pub fn split_rows(self, partitions: &[Partition]) -> Result<Vec<RowBlock>> {
        verify_coverage(partitions, self.height)?;
        let width = self.width;
        let mut cells = self.cells;
        let mut blocks = Vec::with_capacity(partitions.len());
        // 从最后一个分区开始切，每次只搬动该分区自己的行
        for partition in partitions.iter().rev() {
            let rows = cells.split_off(partition.start_row * width);
            blocks.push(RowBlock {
                partition: *partition,
                cells: rows,
            });
        }
        blocks.reverse();
        Ok(blocks)
    }

    /// split_rows 的逆操作
    pub fn from_blocks(width: usize, height: usize, blocks: Vec<RowBlock>) -> Result<Self> {
        Self::from_row_blocks(width, height, blocks.into_iter().map(RowBlock::into_parts).collect())
    }

    /// 渲染端用来归一化颜色
    pub fn max_value(&self) -> u32 {
        self.cells.iter().copied().max().unwrap_or(0)
    }
}

/// 共享内存模式下一个分区独占的行块。
///
/// 由 [`EscapeField::split_rows`] 从同一块网格内存中切出，移交给 worker 线程写入，
/// join 后再由 [`EscapeField::from_blocks`] 按行序拼回。
#[derive(Debug)]
pub struct RowBlock {
    partition: Partition,
    cells: Vec<u32>,
}

impl RowBlock {
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// 本行块的全部单元格，行主序
    pub fn cells_mut(&mut self) -> &mut [u32] {
        &mut self.cells
    }

    pub fn into_parts(self) -> (Partition, Vec<u32>) {
        (self.partition, self.cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition(worker_id: usize, start_row: usize, end_row: usize) -> Partition {
        Partition {
            worker_id,
            start_row,
            end_row,
        }
    }

    #[test]
    fn test_field_accessors() {
        let field = EscapeField::from_row_blocks(
            2,
            2,
            vec![(partition(0, 0, 1), vec![1, 2]), (partition(1, 1, 2), vec![3, 9])],
        )
        .unwrap();
        assert_eq!(field.get(1, 1), Some(9));
        assert_eq!(field.get(2, 0), None);
        assert_eq!(field.row(0), &[1, 2]);
        assert_eq!(field.max_value(), 9);
    }

    #[test]
    fn test_row_blocks_any_order() {
        let field = EscapeField::from_row_blocks(
            1,
            3,
            vec![(partition(1, 1, 3), vec![5, 6]), (partition(0, 0, 1), vec![4])],
        )
        .unwrap();
        assert_eq!(field.as_slice(), &[4, 5, 6]);
    }

    #[test]
    fn test_row_blocks_missing_rows() {
        let result = EscapeField::from_row_blocks(1, 3, vec![(partition(0, 0, 2), vec![1, 2])]);
        assert!(matches!(result, Err(Error::InsufficientData(_))));
    }

    #[test]
    fn test_row_blocks_wrong_size() {
        let result = EscapeField::from_row_blocks(2, 1, vec![(partition(0, 0, 1), vec![1])]);
        assert!(result.is_err());
    }

    #[test]
    fn test_shared_field_split_is_disjoint() {
        let field = EscapeField::new(3, 4);
        let mut blocks = field
            .split_rows(&[partition(0, 0, 1), partition(1, 1, 4)])
            .unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].cells_mut().len(), 3);
        assert_eq!(blocks[1].cells_mut().len(), 9);
        assert_eq!(blocks[1].partition().start_row, 1);
    }

    #[test]
    fn test_shared_field_reassembled_after_writes() {
        let mut blocks = EscapeField::new(2, 2)
            .split_rows(&[partition(0, 0, 1), partition(1, 1, 2)])
            .unwrap();
        blocks[0].cells_mut().copy_from_slice(&[7, 8]);
        blocks[1].cells_mut().copy_from_slice(&[9, 10]);
        blocks.swap(0, 1);
        let field = EscapeField::from_blocks(2, 2, blocks).unwrap();
        assert_eq!(field.as_slice(), &[7, 8, 9, 10]);
    }

    #[test]
    fn test_shared_field_rejects_overlap() {
        let overlapping = EscapeField::new(2, 4).split_rows(&[partition(0, 0, 3), partition(1, 2, 4)]);
        assert!(matches!(overlapping, Err(Error::InvalidConfiguration(_))));
        let out_of_range = EscapeField::new(2, 4).split_rows(&[partition(0, 0, 5)]);
        assert!(out_of_range.is_err());
        let gap = EscapeField::new(2, 4).split_rows(&[partition(0, 0, 1), partition(1, 2, 4)]);
        assert!(gap.is_err());
    }

    #[test]
    fn test_shared_field_concurrent_threads() {
        let partitions: Vec<_> = (0..4).map(|i| partition(i, i * 2, i * 2 + 2)).collect();
        let blocks = EscapeField::new(16, 8).split_rows(&partitions).unwrap();
        let handles: Vec<_> = blocks
            .into_iter()
            .enumerate()
            .map(|(i, mut block)| {
                std::thread::spawn(move || {
                    for cell in block.cells_mut() {
                        *cell = i as u32 + 1;
                    }
                    block
                })
            })
            .collect();
        let blocks = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let field = EscapeField::from_blocks(16, 8, blocks).unwrap();
        for row in 0..8 {
            assert!(field.row(row).iter().all(|&v| v == (row / 2) as u32 + 1));
        }
    }
}
