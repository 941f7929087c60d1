use anyhow::Result;
use prettytable::{row, Table};
use scheduler::task_splitter::{verify_coverage, OversubscribePolicy, TaskSplitter};

/// 打印不同高度与 worker 数下的行划分
fn main() -> Result<()> {
    let splitter = TaskSplitter::default();
    for (height, workers) in [(100, 4), (1080, 7), (5, 8)] {
        let plan = splitter.partition(height, workers)?;
        verify_coverage(&plan.partitions, height)?;

        println!(
            "\n高度 {}，请求 {} 个 worker，实际 {}{}",
            height,
            plan.requested_workers,
            plan.worker_count(),
            if plan.adjusted() { "（已收缩）" } else { "" }
        );
        let mut table = Table::new();
        table.add_row(row!["Worker", "起始行", "结束行", "行数"]);
        for p in &plan.partitions {
            table.add_row(row![p.worker_id, p.start_row, p.end_row, p.row_count()]);
        }
        table.printstd();
    }

    match TaskSplitter::new(OversubscribePolicy::Reject).partition(5, 8) {
        Ok(_) => println!("\n意外：Reject 策略接受了超额 worker"),
        Err(e) => println!("\nReject 策略: {}", e),
    }
    Ok(())
}
