//! # 同步原语
//!
//! 计数信号量是底座，锁与条件变量层层叠在它上面。
//! 单处理器协作式的模型：任何磁盘或控制台操作都可能让出当前线程，
//! 这些原语只管互斥与先后，不碰中断。

mod semaphore;
pub use semaphore::Semaphore;

mod lock;
pub use lock::Lock;

mod condvar;
pub use condvar::Condition;
