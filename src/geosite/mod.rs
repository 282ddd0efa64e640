pub mod parser;

pub use parser::{GeoDomain, parse_geosite_list};

use crate::error::ConfigError;
use lazy_static::lazy_static;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

// 解析结果的缓存键：文件路径 + 请求的类目集合
type ParsedKey = (PathBuf, BTreeSet<String>);
type CategoryMap = HashMap<String, Vec<GeoDomain>>;

// geosite 加载器。文件内容按规范化路径缓存一次，
// 解析结果按 (文件, 类目集合) 缓存；同一文件的解析由独立的锁串行化，
// 已缓存结果的并发读取不需要等待解析锁
pub struct GeositeLoader {
    contents: Mutex<HashMap<PathBuf, Arc<Vec<u8>>>>,
    parsed: Mutex<HashMap<ParsedKey, Arc<CategoryMap>>>,
    file_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

lazy_static! {
    // 进程级加载器，所有 geosite 匹配器共享文件与解析缓存
    static ref LOADER: GeositeLoader = GeositeLoader::new();
}

impl GeositeLoader {
    pub fn new() -> Self {
        Self {
            contents: Mutex::new(HashMap::new()),
            parsed: Mutex::new(HashMap::new()),
            file_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn load(
        &self,
        path: &Path,
        categories: &BTreeSet<String>,
    ) -> Result<Arc<CategoryMap>, ConfigError> {
        let clean: PathBuf = clean_path(path);
        let key: ParsedKey = (clean.clone(), categories.clone());

        if let Some(hit) = self.parsed.lock().unwrap().get(&key) {
            return Ok(Arc::clone(hit));
        }

        // 同一文件的解析串行化，避免并发加载重复劳动
        let file_lock = {
            let mut locks = self.file_locks.lock().unwrap();
            Arc::clone(locks.entry(clean.clone()).or_default())
        };
        let _guard = file_lock.lock().unwrap();

        // 拿到文件锁后重查，前一个持锁者可能已完成解析
        if let Some(hit) = self.parsed.lock().unwrap().get(&key) {
            return Ok(Arc::clone(hit));
        }

        let data = self.file_content(&clean)?;
        debug!(file = %clean.display(), categories = categories.len(), "parsing geosite dataset");
        let parsed = Arc::new(parse_geosite_list(&data, Some(categories))?);
        self.parsed.lock().unwrap().insert(key, Arc::clone(&parsed));
        Ok(parsed)
    }

    fn file_content(&self, path: &PathBuf) -> Result<Arc<Vec<u8>>, ConfigError> {
        if let Some(hit) = self.contents.lock().unwrap().get(path) {
            return Ok(Arc::clone(hit));
        }
        let data = Arc::new(fs::read(path).map_err(|e| {
            ConfigError::Geosite(format!("read geosite file {}: {}", path.display(), e))
        })?);
        self.contents
            .lock()
            .unwrap()
            .insert(path.clone(), Arc::clone(&data));
        Ok(data)
    }
}

impl Default for GeositeLoader {
    fn default() -> Self {
        Self::new()
    }
}

// 加载指定类目集合，走进程级缓存
pub fn load_categories(
    path: &Path,
    categories: &BTreeSet<String>,
) -> Result<Arc<CategoryMap>, ConfigError> {
    LOADER.load(path, categories)
}

fn clean_path(path: &Path) -> PathBuf {
    // 仅做词法规范化，不解引用符号链接
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            std::path::Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}
