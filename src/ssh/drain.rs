//! 输出流读取
//!
//! stdout 与 stderr 必须并发读取：远端任一流的缓冲区写满时，
//! 顺序读取会让另一条流永远等不到消费者

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// 逐行读取直到 EOF，每行以 `\n` 结尾拼接
///
/// 行尾的 `\r\n` 与 `\n` 一样视为换行；非 UTF-8 字节按替换字符处理
pub async fn read_lines<R>(reader: R) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut collected = String::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }

        if line.last() == Some(&b'\n') {
            line.pop();
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        collected.push_str(&String::from_utf8_lossy(&line));
        collected.push('\n');
    }

    Ok(collected)
}

/// 并发读取两条流，两者都到达 EOF 后返回 `(stdout, stderr)`
pub async fn drain_both<O, E>(stdout: O, stderr: E) -> io::Result<(String, String)>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    tokio::try_join!(read_lines(stdout), read_lines(stderr))
}
