use crate::error::AppError;
use crate::resolver::DnsResolver;
use async_trait::async_trait;
use hickory_proto::op::Message;
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

// 并发竞速的解析器组。每次查询随机挑选 K 个子解析器并发发起，
// 第一个成功响应立即胜出，其余任务随即被中止
pub struct GroupResolver {
    name: String,
    children: Vec<Arc<dyn DnsResolver>>,
    concurrent: usize,
}

impl GroupResolver {
    pub fn new(children: Vec<Arc<dyn DnsResolver>>, parallel: usize) -> Self {
        let concurrent = parallel.max(1).min(children.len().max(1));
        Self {
            name: format!("group:{{{}:{}}}", children.len(), concurrent),
            children,
            concurrent,
        }
    }

    // 对子解析器下标做均匀随机置换，取前 K 个
    fn pick(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.children.len()).collect();
        indices.shuffle(&mut thread_rng());
        indices.truncate(self.concurrent);
        indices
    }
}

#[async_trait]
impl DnsResolver for GroupResolver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, req: &Message) -> Result<Message, AppError> {
        if self.children.is_empty() {
            return Err(AppError::AllUpstreamsFailed("no upstream configured".to_string()));
        }
        debug!(resolver = %self.name, concurrent = self.concurrent, "group resolver start query");

        let (tx, mut rx) = mpsc::channel::<Result<(String, Message), (String, AppError)>>(
            self.concurrent,
        );
        let mut handles = Vec::with_capacity(self.concurrent);
        for idx in self.pick() {
            let child = Arc::clone(&self.children[idx]);
            // 下层传输可能改写报文（标志位、id），每个子任务各拿一份克隆
            let req = req.clone();
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let name = child.name().to_string();
                let result = match child.query(&req).await {
                    Ok(resp) => Ok((name, resp)),
                    Err(err) => Err((name, err)),
                };
                let _ = tx.send(result).await;
            }));
        }
        drop(tx);

        let mut first_err: Option<AppError> = None;
        let mut pending = handles.len();
        while pending > 0 {
            match rx.recv().await {
                Some(Ok((winner, resp))) => {
                    // 胜者产生后立刻中止其余子任务，释放其持有的连接
                    for handle in &handles {
                        handle.abort();
                    }
                    debug!(resolver = %self.name, winner = %winner, "group resolver query success");
                    return Ok(resp);
                }
                Some(Err((child, err))) => {
                    // 落败方的真实错误记录为 warn；被中止的任务不会走到这里
                    warn!(resolver = %self.name, child = %child, error = %err, "group child failed");
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                    pending -= 1;
                }
                None => break,
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Err(AppError::AllUpstreamsFailed(self.name.clone())),
        }
    }
}
