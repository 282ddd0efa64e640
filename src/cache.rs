use crate::config::CacheConfig;
use crate::error::{AppError, ConfigError};
use crate::matcher::normalize_domain;
use crate::r#const::cache_limits;
use crate::resolver::DnsResolver;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hickory_proto::op::Message;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::timeout;
use tokio_graceful_shutdown::SubsystemHandle;
use tracing::{debug, info, warn, Instrument};

// 缓存条目：上游响应的打包字节与绝对过期时刻。
// 命中时重新解包，调用方拿到的是独立副本，改动不会串回缓存
#[derive(Debug, Clone)]
struct CacheEntry {
    data: Vec<u8>,
    expire: SystemTime,
}

// 同一把锁保护 LRU、脏标记与刷新中的键集合
struct CacheState {
    lru: LruCache<String, CacheEntry>,
    dirty: bool,
    inflight: HashSet<String>,
}

// 落盘记录，按行序列化为 JSON
#[derive(Debug, Serialize, Deserialize)]
struct PersistRecord {
    key: String,
    // unix 毫秒
    expire: i64,
    // base64 编码的打包字节
    msg: String,
}

enum Lookup {
    Fresh(Message),
    Stale(Message),
    Miss,
}

// 响应缓存管理器。构建一次，由所有 forward 动作共享；
// 下游查询与报文解析都在锁外进行
pub struct CacheManager {
    lazy: bool,
    persist: bool,
    file: PathBuf,
    interval: Duration,
    // Arc 包一层，后台刷新任务只携带状态句柄
    state: Option<Arc<Mutex<CacheState>>>,
}

impl CacheManager {
    pub fn new(cfg: &CacheConfig) -> Result<Self, ConfigError> {
        let state = NonZeroUsize::new(cfg.size).map(|size| {
            Arc::new(Mutex::new(CacheState {
                lru: LruCache::new(size),
                dirty: false,
                inflight: HashSet::new(),
            }))
        });
        let interval = if cfg.interval == 0 {
            cache_limits::DEFAULT_INTERVAL_MS
        } else {
            cfg.interval
        };
        let manager = Self {
            lazy: cfg.lazy,
            persist: cfg.persist && !cfg.file.trim().is_empty(),
            file: PathBuf::from(cfg.file.trim()),
            interval: Duration::from_millis(interval),
            state,
        };
        if manager.persist && manager.enabled() {
            if let Err(err) = manager.load_from_file() {
                // 持久化文件异常不阻止启动，按空缓存继续
                warn!(error = %err, "load persisted dns cache failed");
            }
        }
        Ok(manager)
    }

    // size 为 0 时缓存整体关闭
    pub fn enabled(&self) -> bool {
        self.state.is_some()
    }

    pub fn persist_enabled(&self) -> bool {
        self.persist && self.enabled()
    }

    pub fn len(&self) -> usize {
        self.state
            .as_ref()
            .map(|s| s.lock().unwrap().lru.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // 经缓存的下游查询入口
    pub async fn query(
        &self,
        next: &Arc<dyn DnsResolver>,
        req: &Message,
    ) -> Result<Message, AppError> {
        if !self.enabled() {
            return next.query(req).await;
        }
        let Some(key) = build_cache_key(req) else {
            return next.query(req).await;
        };

        match self.get(&key, req) {
            Lookup::Fresh(resp) => {
                debug!(key = %key, "dns response served from cache");
                return Ok(resp);
            }
            Lookup::Stale(resp) => {
                if self.lazy {
                    // 先把过期数据还给调用方，后台补一次刷新
                    debug!(key = %key, "serving stale dns response, scheduling refresh");
                    self.schedule_refresh(next, &key, req.clone());
                    return Ok(resp);
                }
                self.remove(&key);
            }
            Lookup::Miss => {}
        }

        let resp = next.query(req).await?;
        self.store(&key, &resp);
        Ok(resp)
    }

    // 命中时在锁内只复制字节，解析与 TTL 调整在锁外完成
    fn get(&self, key: &str, req: &Message) -> Lookup {
        let Some(state) = &self.state else {
            return Lookup::Miss;
        };
        let (data, expire) = {
            let mut state = state.lock().unwrap();
            match state.lru.get(key) {
                Some(entry) => (entry.data.clone(), entry.expire),
                None => return Lookup::Miss,
            }
        };

        let mut msg = match Message::from_vec(&data) {
            Ok(msg) => msg,
            Err(_) => {
                warn!(key = %key, "invalid cache data, treated as miss");
                return Lookup::Miss;
            }
        };

        let now = SystemTime::now();
        let remaining = expire
            .duration_since(now)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        clamp_ttl(&mut msg, remaining);

        // 打包数据里的 id 与 question 大小写可能与本次请求不一致
        msg.set_id(req.id());
        msg.take_queries();
        for query in req.queries() {
            msg.add_query(query.clone());
        }

        if now <= expire {
            Lookup::Fresh(msg)
        } else {
            Lookup::Stale(msg)
        }
    }

    fn remove(&self, key: &str) {
        if let Some(state) = &self.state {
            let mut state = state.lock().unwrap();
            state.lru.pop(key);
            state.dirty = true;
        }
    }

    fn store(&self, key: &str, msg: &Message) {
        if let Some(state) = &self.state {
            store_entry(state, key, msg);
        }
    }

    // 懒更新：同一个键最多只有一个刷新任务在途。
    // 刷新任务脱离请求的取消范围，但继承其日志 span 以保留 trace id
    fn schedule_refresh(&self, next: &Arc<dyn DnsResolver>, key: &str, req: Message) {
        let Some(state) = &self.state else { return };
        {
            let mut state = state.lock().unwrap();
            if !state.inflight.insert(key.to_string()) {
                return;
            }
        }

        let state = Arc::clone(state);
        let next = Arc::clone(next);
        let key = key.to_string();
        let span = tracing::Span::current();
        tokio::spawn(
            async move {
                // 任何退出路径都要清掉在途标记
                let _guard = InflightGuard {
                    state: Arc::clone(&state),
                    key: key.clone(),
                };
                let deadline = Duration::from_secs(cache_limits::REFRESH_TIMEOUT_SECS);
                match timeout(deadline, next.query(&req)).await {
                    Ok(Ok(resp)) => {
                        store_entry(&state, &key, &resp);
                        debug!(key = %key, resolver = %next.name(), "lazy cache refresh success");
                    }
                    Ok(Err(err)) => {
                        warn!(key = %key, resolver = %next.name(), error = %err, "lazy cache refresh failed");
                    }
                    Err(_) => {
                        warn!(key = %key, resolver = %next.name(), "lazy cache refresh timed out");
                    }
                }
            }
            .instrument(span),
        );
    }

    // 持久化循环：每个周期检查脏标记，干净则跳过；
    // 收到关闭信号后在当前周期结束时退出
    pub async fn run_persist_loop(self: Arc<Self>, subsys: SubsystemHandle) -> Result<(), AppError> {
        if !self.persist_enabled() {
            return Ok(());
        }
        info!(file = %self.file.display(), interval_ms = self.interval.as_millis() as u64, "cache persistence loop started");
        let mut ticker = tokio::time::interval(self.interval);
        // interval 的首个 tick 立即触发，消耗掉它
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.flush_if_dirty().await {
                        // 写盘失败下个周期重试
                        warn!(error = %err, "persist dns cache failed");
                    }
                }
                _ = subsys.on_shutdown_requested() => {
                    // 退出前把未落盘的改动带出去
                    if let Err(err) = self.flush_if_dirty().await {
                        warn!(error = %err, "final cache flush failed");
                    }
                    debug!("cache persistence loop exit");
                    return Ok(());
                }
            }
        }
    }

    // 脏则写一次快照。失败时恢复脏标记，等待下次机会
    pub async fn flush_if_dirty(&self) -> Result<(), AppError> {
        if !self.persist_enabled() {
            return Ok(());
        }
        let Some(state) = &self.state else {
            return Ok(());
        };
        let snapshot = {
            let mut state = state.lock().unwrap();
            if !state.dirty {
                return Ok(());
            }
            state.dirty = false;
            snapshot_records(&mut state.lru)
        };
        if let Err(err) = self.write_snapshot(&snapshot).await {
            state.lock().unwrap().dirty = true;
            return Err(err);
        }
        Ok(())
    }

    // 快照写入临时文件后原子替换，读者看到的要么是旧文件要么是完整的新文件
    async fn write_snapshot(&self, records: &[PersistRecord]) -> Result<(), AppError> {
        if let Some(dir) = self.file.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }
        let mut buf = String::with_capacity(records.len() * 128);
        for record in records {
            buf.push_str(&serde_json::to_string(record).map_err(|e| AppError::Cache(e.to_string()))?);
            buf.push('\n');
        }
        let tmp = tmp_path(&self.file);
        tokio::fs::write(&tmp, buf).await?;
        tokio::fs::rename(&tmp, &self.file).await?;
        info!(file = %self.file.display(), record_count = records.len(), "dns cache persisted");
        Ok(())
    }

    // 启动时回灌持久化文件。坏行跳过；未开启懒更新时丢弃已过期的记录
    fn load_from_file(&self) -> Result<(), AppError> {
        let Some(state) = &self.state else {
            return Ok(());
        };
        if !self.file.exists() {
            return Ok(());
        }
        let content = std::fs::read_to_string(&self.file)?;
        let now = SystemTime::now();
        let mut loaded = 0usize;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.len() > cache_limits::MAX_PERSIST_LINE {
                continue;
            }
            let Ok(record) = serde_json::from_str::<PersistRecord>(line) else {
                continue;
            };
            let Ok(data) = BASE64.decode(&record.msg) else {
                continue;
            };
            let expire = if record.expire >= 0 {
                UNIX_EPOCH + Duration::from_millis(record.expire as u64)
            } else {
                UNIX_EPOCH
            };
            if expire < now && !self.lazy {
                continue;
            }
            let mut state = state.lock().unwrap();
            state.lru.put(record.key, CacheEntry { data, expire });
            loaded += 1;
        }
        if loaded > 0 {
            info!(file = %self.file.display(), record_count = loaded, "dns cache restored from disk");
        }
        Ok(())
    }
}

// 刷新任务的在途标记守卫
struct InflightGuard {
    state: Arc<Mutex<CacheState>>,
    key: String,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.state.lock().unwrap().inflight.remove(&self.key);
    }
}

// 写入一条缓存。无正 TTL 的应答不缓存
fn store_entry(state: &Mutex<CacheState>, key: &str, msg: &Message) {
    let Some(ttl) = extract_min_ttl(msg) else {
        return;
    };
    let Ok(packed) = msg.to_vec() else {
        return;
    };
    let expire = SystemTime::now() + Duration::from_secs(u64::from(ttl));
    let mut state = state.lock().unwrap();
    state.lru.put(
        key.to_string(),
        CacheEntry {
            data: packed,
            expire,
        },
    );
    state.dirty = true;
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn snapshot_records(lru: &mut LruCache<String, CacheEntry>) -> Vec<PersistRecord> {
    lru.iter()
        .map(|(key, entry)| PersistRecord {
            key: key.clone(),
            expire: entry
                .expire
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0),
            msg: BASE64.encode(&entry.data),
        })
        .collect()
}

// 缓存键：小写、去末尾点的域名 + qtype + qclass
fn build_cache_key(req: &Message) -> Option<String> {
    let query = req.queries().first()?;
    let domain = normalize_domain(&query.name().to_utf8());
    if domain.is_empty() {
        return None;
    }
    Some(format!(
        "{}|{}|{}",
        domain,
        u16::from(query.query_type()),
        u16::from(query.query_class())
    ))
}

// 取最小正 TTL：按 answer、authority、additional 的顺序，
// 第一个含正 TTL 的 section 胜出；全无正 TTL 则不缓存
fn extract_min_ttl(msg: &Message) -> Option<u32> {
    for section in [msg.answers(), msg.name_servers(), msg.additionals()] {
        let min = section
            .iter()
            .map(|rr| rr.ttl())
            .filter(|ttl| *ttl > 0)
            .min();
        if min.is_some() {
            return min;
        }
    }
    None
}

// 把所有 section 的 TTL 压到剩余寿命以内
fn clamp_ttl(msg: &mut Message, ttl: u32) {
    for record in msg.answers_mut() {
        if record.ttl() > ttl {
            record.set_ttl(ttl);
        }
    }
    for record in msg.name_servers_mut() {
        if record.ttl() > ttl {
            record.set_ttl(ttl);
        }
    }
    for record in msg.additionals_mut() {
        if record.ttl() > ttl {
            record.set_ttl(ttl);
        }
    }
}

// 在任意解析器之上叠加缓存层
pub struct CachedResolver {
    name: String,
    next: Arc<dyn DnsResolver>,
    cache: Arc<CacheManager>,
}

impl CachedResolver {
    pub fn new(next: Arc<dyn DnsResolver>, cache: Arc<CacheManager>) -> Self {
        Self {
            name: format!("cache({})", next.name()),
            next,
            cache,
        }
    }
}

#[async_trait]
impl DnsResolver for CachedResolver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, req: &Message) -> Result<Message, AppError> {
        self.cache.query(&self.next, req).await
    }
}
