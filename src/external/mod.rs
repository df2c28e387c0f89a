//! 外部协作方：持久化存储、访问控制、加密
//!
//! 编排引擎只依赖这里的 trait；具体后端（数据库、IAM、KMS 等）由调用方注入。

pub mod access;
pub mod crypto;
pub mod store;

pub use access::{AccessControl, AllowAll, RoleList};
pub use crypto::{Encryptor, NoopEncryptor, XorEncryptor};
pub use store::{AgentSnapshot, DurableStore, ExecutionLog, FileStore, InMemoryStore};
