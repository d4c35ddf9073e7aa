//! 同步键值存储
//!
//! 对应浏览器同源的 LocalStorage：同步读写、跨刷新保留。
//! 测试使用 [`MemoryStore`]，命令行工具使用 [`FileStore`]。

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::AuthResult;

pub trait KeyValueStore {
    /// 键不存在或读取失败时返回 `None`
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> AuthResult<()>;
    /// 删除不存在的键不是错误
    fn remove(&self, key: &str) -> AuthResult<()>;
}

// =========================================================
// 内存实现
// =========================================================

/// 内存键值区
///
/// 克隆体共享同一块数据，和同源页面共享 LocalStorage 的行为一致。
#[derive(Clone, Default)]
pub struct MemoryStore {
    map: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> AuthResult<()> {
        self.map
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AuthResult<()> {
        self.map.borrow_mut().remove(key);
        Ok(())
    }
}

// =========================================================
// 文件实现
// =========================================================

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStore;

#[cfg(not(target_arch = "wasm32"))]
mod file {
    use std::collections::HashMap;
    use std::fs;
    use std::io::ErrorKind;
    use std::path::{Path, PathBuf};

    use super::KeyValueStore;
    use crate::error::{AuthError, AuthResult};

    /// 单个 JSON 文件里的键值区，每次操作都直接读写文件
    #[derive(Debug, Clone)]
    pub struct FileStore {
        path: PathBuf,
    }

    impl FileStore {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        fn read_map(&self) -> AuthResult<HashMap<String, String>> {
            let raw = match fs::read_to_string(&self.path) {
                Ok(raw) => raw,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
                Err(e) => {
                    return Err(AuthError::storage(e.to_string())
                        .with_source(e)
                        .in_op_with("file_store.read", self.path.display().to_string()));
                }
            };
            if raw.trim().is_empty() {
                return Ok(HashMap::new());
            }
            serde_json::from_str(&raw).map_err(|e| {
                AuthError::corrupt(e.to_string())
                    .in_op_with("file_store.read", self.path.display().to_string())
            })
        }

        /// 读取失败时从空表开始，损坏的文件会被覆盖
        fn read_for_update(&self) -> HashMap<String, String> {
            self.read_map().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "session file unreadable, starting over");
                HashMap::new()
            })
        }

        fn write_map(&self, map: &HashMap<String, String>) -> AuthResult<()> {
            let op = || self.path.display().to_string();
            if map.is_empty() {
                return match fs::remove_file(&self.path) {
                    Err(e) if e.kind() != ErrorKind::NotFound => Err(AuthError::storage(e.to_string())
                        .with_source(e)
                        .in_op_with("file_store.remove", op())),
                    _ => Ok(()),
                };
            }
            let encoded = serde_json::to_string_pretty(map)
                .map_err(|e| AuthError::internal(e.to_string()).in_op("file_store.encode"))?;
            fs::write(&self.path, encoded).map_err(|e| {
                AuthError::storage(e.to_string())
                    .with_source(e)
                    .in_op_with("file_store.write", op())
            })
        }
    }

    impl KeyValueStore for FileStore {
        fn get(&self, key: &str) -> Option<String> {
            match self.read_map() {
                Ok(mut map) => map.remove(key),
                Err(e) => {
                    tracing::warn!(error = %e, key, "session file unreadable");
                    None
                }
            }
        }

        fn set(&self, key: &str, value: &str) -> AuthResult<()> {
            let mut map = self.read_for_update();
            map.insert(key.to_string(), value.to_string());
            self.write_map(&map)
        }

        fn remove(&self, key: &str) -> AuthResult<()> {
            let mut map = self.read_for_update();
            if map.remove(key).is_none() && self.path.exists() {
                return Ok(());
            }
            self.write_map(&map)
        }
    }
}

// =========================================================
// 浏览器实现
// =========================================================

#[cfg(target_arch = "wasm32")]
pub use browser::LocalStorage;

#[cfg(target_arch = "wasm32")]
mod browser {
    use super::KeyValueStore;
    use crate::error::{AuthError, AuthResult};

    /// 浏览器 LocalStorage
    pub struct LocalStorage;

    impl LocalStorage {
        fn storage() -> Option<web_sys::Storage> {
            web_sys::window()?.local_storage().ok()?
        }
    }

    impl KeyValueStore for LocalStorage {
        fn get(&self, key: &str) -> Option<String> {
            Self::storage()?.get_item(key).ok()?
        }

        fn set(&self, key: &str, value: &str) -> AuthResult<()> {
            let storage = Self::storage()
                .ok_or_else(|| AuthError::storage("localStorage unavailable"))?;
            // 配额超限等情况会在这里失败
            storage
                .set_item(key, value)
                .map_err(|e| AuthError::storage(format!("{:?}", e)).in_op_with("storage.set", key))
        }

        fn remove(&self, key: &str) -> AuthResult<()> {
            let storage = Self::storage()
                .ok_or_else(|| AuthError::storage("localStorage unavailable"))?;
            storage
                .remove_item(key)
                .map_err(|e| AuthError::storage(format!("{:?}", e)).in_op_with("storage.remove", key))
        }
    }
}
