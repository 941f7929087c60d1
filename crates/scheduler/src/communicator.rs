// communicator.rs
// 分布式模式使用的集合通信接口（屏障 + 收集），以及进程内模拟集群的实现。
use crate::error::{Error, Result};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Barrier};

/// 节点组内的集合通信。每个节点持有一个实现，rank 在 [0, size) 内唯一。
pub trait Communicator: Send {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// 所有节点都到达后才返回
    fn barrier(&self) -> Result<()>;

    /// 每个节点把 payload 发送给 root。
    /// root 返回按 rank 排序的全部 payload，其余节点返回 None。
    fn gather(&self, root: usize, payload: Vec<u8>) -> Result<Option<Vec<Vec<u8>>>>;
}

/// 进程内模拟集群：节点是线程，屏障用 std::sync::Barrier，
/// 消息通过 channel 以字节形式传递，节点之间不共享任何网格内存。
pub struct LocalCluster;

impl LocalCluster {
    /// 创建 size 个互相连通的端点，第 i 个端点的 rank 为 i
    pub fn endpoints(size: usize) -> Result<Vec<LocalEndpoint>> {
        if size == 0 {
            return Err(Error::InvalidConfiguration("集群节点数必须大于0".to_string()));
        }
        let barrier = Arc::new(Barrier::new(size));
        let (senders, receivers): (Vec<Sender<(usize, Vec<u8>)>>, Vec<Receiver<(usize, Vec<u8>)>>) =
            (0..size).map(|_| mpsc::channel()).unzip();

        Ok(receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalEndpoint {
                rank,
                size,
                barrier: Arc::clone(&barrier),
                peers: senders.clone(),
                inbox,
            })
            .collect())
    }
}

pub struct LocalEndpoint {
    rank: usize,
    size: usize,
    barrier: Arc<Barrier>,
    peers: Vec<Sender<(usize, Vec<u8>)>>,
    inbox: Receiver<(usize, Vec<u8>)>,
}

impl Communicator for LocalEndpoint {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) -> Result<()> {
        self.barrier.wait();
        Ok(())
    }

    fn gather(&self, root: usize, payload: Vec<u8>) -> Result<Option<Vec<Vec<u8>>>> {
        if root >= self.size {
            return Err(Error::Communication(format!(
                "root {} 超出集群大小 {}",
                root, self.size
            )));
        }
        if self.rank != root {
            self.peers[root]
                .send((self.rank, payload))
                .map_err(|_| Error::Communication(format!("节点 {} 无法发送到 root", self.rank)))?;
            return Ok(None);
        }

        let mut slots: Vec<Option<Vec<u8>>> = vec![None; self.size];
        slots[root] = Some(payload);
        for _ in 1..self.size {
            let (from, bytes) = self
                .inbox
                .recv()
                .map_err(|_| Error::Communication("收集过程中有节点断开".to_string()))?;
            match slots.get_mut(from) {
                Some(slot) if slot.is_none() => *slot = Some(bytes),
                _ => {
                    return Err(Error::Communication(format!(
                        "收到来自节点 {} 的非法或重复消息",
                        from
                    )))
                }
            }
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(rank, slot)| {
                slot.ok_or_else(|| Error::Communication(format!("缺少节点 {} 的数据", rank)))
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}
