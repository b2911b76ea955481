use super::model::HistoryEntry;
use crate::Result;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const HISTORY_FILE: &str = "history.jsonl";
// 20 MB 之后触发压缩
const COMPACTION_THRESHOLD_BYTES: u64 = 20 * 1024 * 1024;
// 压缩后保留最近 10,000 条
const MAX_ENTRIES: usize = 10_000;

/// 追加写入的 JSONL 运行历史
pub struct HistoryStorage {
    file_path: PathBuf,
    compaction_threshold: u64,
    max_entries: usize,
}

impl HistoryStorage {
    /// 使用 `<dir>/history.jsonl`
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self::new_with_path(dir.as_ref().join(HISTORY_FILE))
    }

    pub fn new_with_path(path: PathBuf) -> Self {
        Self {
            file_path: path,
            compaction_threshold: COMPACTION_THRESHOLD_BYTES,
            max_entries: MAX_ENTRIES,
        }
    }

    /// 调整压缩阈值与保留条数
    pub fn with_limits(mut self, threshold_bytes: u64, max_entries: usize) -> Self {
        self.compaction_threshold = threshold_bytes;
        self.max_entries = max_entries;
        self
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// 追加一条记录
    ///
    /// 写入期间持有排他锁，多个 radar 进程同时写入也不会交错。
    pub fn append(&self, entry: &HistoryEntry) -> Result<()> {
        if let Some(parent) = self.file_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(entry)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        file.lock_exclusive()?;
        writeln!(file, "{}", line)?;
        // 文件关闭时释放锁
        Ok(())
    }

    /// 全部记录（按时间先后），必要时先压缩
    pub fn list(&self) -> Result<Vec<HistoryEntry>> {
        if !self.file_path.exists() {
            return Ok(Vec::new());
        }
        // 压缩放在读路径上，写路径只做追加
        self.compact_if_needed()?;

        let file = File::open(&self.file_path)?;
        file.lock_shared()?;
        Ok(parse_entries(BufReader::new(&file)))
    }

    /// 最近 N 条，旧的在前
    pub fn tail(&self, n: usize) -> Result<Vec<HistoryEntry>> {
        let mut entries = self.list()?;
        let skip = entries.len().saturating_sub(n);
        Ok(entries.split_off(skip))
    }

    fn compact_if_needed(&self) -> Result<()> {
        if fs::metadata(&self.file_path)?.len() < self.compaction_threshold {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.file_path)?;
        file.lock_exclusive()?;

        // 拿到锁后再检查一次，其他进程可能刚压缩过
        if file.metadata()?.len() < self.compaction_threshold {
            return Ok(());
        }

        let entries = parse_entries(BufReader::new(&file));
        if entries.len() <= self.max_entries {
            return Ok(());
        }
        let keep = &entries[entries.len() - self.max_entries..];

        // 原地截断重写，锁一直有效
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        let mut writer = BufWriter::new(&file);
        for entry in keep {
            writeln!(writer, "{}", serde_json::to_string(entry)?)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// 逐行解析，跳过空行和损坏的行
fn parse_entries<R: BufRead>(reader: R) -> Vec<HistoryEntry> {
    reader
        .lines()
        .map_while(|line| line.ok())
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(&line).ok())
        .collect()
}
