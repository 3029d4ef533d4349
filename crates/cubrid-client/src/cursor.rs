//! Cursor over a query-shaped result.
//!
//! The cursor holds the window of tuples already received. When the caller
//! advances past that window it issues a `Fetch` for the rows that follow,
//! so every row the server reported is reachable without an explicit
//! refetch call. [`Cursor::seek`] moves the position with a `Cursor`
//! request; rows are then read forward from there.

use std::collections::VecDeque;
use std::sync::Arc;

use cubrid_protocol::{ColumnMetadata, CursorOrigin, FunctionCode, ResponseReader};

use crate::error::{Error, Result};
use crate::row::{Row, read_tuple};
use crate::session::Session;

/// Row reader bound to one server-side result.
pub struct Cursor {
    handle: i32,
    position: i32,
    result_count: i32,
    fetched: i32,
    window: VecDeque<Row>,
    columns: Arc<[ColumnMetadata]>,
    width: usize,
    runtime_typed: bool,
    fetch_size: i32,
    generation: u64,
}

impl Cursor {
    pub(crate) fn new(
        handle: i32,
        result_count: i32,
        columns: Arc<[ColumnMetadata]>,
        runtime_typed: bool,
        fetch_size: i32,
        generation: u64,
    ) -> Self {
        let width = columns.len();
        Self {
            handle,
            position: 0,
            result_count: result_count.max(0),
            fetched: 0,
            window: VecDeque::new(),
            columns,
            width,
            runtime_typed,
            fetch_size,
            generation,
        }
    }

    /// Rows the server reported for this result.
    #[must_use]
    pub fn result_count(&self) -> i32 {
        self.result_count
    }

    /// Number of the last row returned (1-based); 0 before the first.
    #[must_use]
    pub fn position(&self) -> i32 {
        self.position
    }

    /// Number of rows received so far, returned or not.
    #[must_use]
    pub fn fetched_count(&self) -> i32 {
        self.fetched
    }

    /// Column metadata of the rows.
    #[must_use]
    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    /// Append a tuple batch starting at row `start` (1-based).
    ///
    /// Reads an `i32` tuple count followed by the tuples. Returns the
    /// number of tuples read.
    pub(crate) fn fill(&mut self, start: i32, body: &mut ResponseReader) -> Result<i32> {
        let count = body.read_i32()?.max(0);
        for _ in 0..count {
            let row = read_tuple(body, &self.columns, self.width, self.runtime_typed)?;
            self.window.push_back(row);
        }
        self.fetched = start - 1 + count;
        Ok(count)
    }

    /// Advance to the next row.
    ///
    /// Returns `None` once every reported row has been returned. Rows past
    /// the received window are fetched first.
    pub async fn next(&mut self, session: &mut Session) -> Result<Option<Row>> {
        if self.position >= self.result_count {
            return Ok(None);
        }
        let next = self.position + 1;

        if next > self.fetched {
            self.fetch(session, next).await?;
            if next > self.fetched {
                tracing::warn!(
                    handle = self.handle,
                    position = next,
                    result_count = self.result_count,
                    "server returned no rows before the reported end"
                );
                self.result_count = self.fetched;
                return Ok(None);
            }
        }

        self.position = next;
        Ok(self.window.pop_front())
    }

    /// Reposition the cursor so that the next row returned is the target row.
    ///
    /// With [`CursorOrigin::First`] the target is row `offset` (1-based).
    /// With [`CursorOrigin::Current`] it is `offset` rows past the last row
    /// returned, so an offset of 1 changes nothing. With
    /// [`CursorOrigin::Last`] it counts back from the final row, which is
    /// offset 1.
    ///
    /// The row count the server reports replaces the one known so far.
    /// Returns `false` and keeps the position when the target lies outside
    /// the result.
    pub async fn seek(
        &mut self,
        session: &mut Session,
        offset: i32,
        origin: CursorOrigin,
    ) -> Result<bool> {
        let (offset, origin) = match origin {
            CursorOrigin::Current => (self.position + offset, CursorOrigin::First),
            other => (offset, other),
        };

        session.ready().await?;
        if session.generation() != self.generation {
            return Err(Error::StatementClosed);
        }

        tracing::debug!(
            handle = self.handle,
            offset = offset,
            origin = ?origin,
            "moving cursor"
        );
        let writer = session.begin_request(FunctionCode::Cursor);
        writer.write_int_arg(self.handle);
        writer.write_int_arg(offset);
        writer.write_byte_arg(origin as u8);

        let mut response = session.send_request().await?;
        self.result_count = response.body().read_i32()?.max(0);

        let target = match origin {
            CursorOrigin::Last => self.result_count - offset + 1,
            _ => offset,
        };
        if target < 1 || target > self.result_count {
            return Ok(false);
        }

        let skip = target - 1 - self.position;
        if skip >= 0 && target <= self.fetched {
            self.window.drain(..skip as usize);
        } else {
            self.window.clear();
            self.fetched = target - 1;
        }
        self.position = target - 1;
        Ok(true)
    }

    async fn fetch(&mut self, session: &mut Session, start: i32) -> Result<()> {
        session.ready().await?;
        if session.generation() != self.generation {
            return Err(Error::StatementClosed);
        }

        tracing::debug!(
            handle = self.handle,
            start = start,
            fetch_size = self.fetch_size,
            "fetching rows"
        );
        let writer = session.begin_request(FunctionCode::Fetch);
        writer.write_int_arg(self.handle);
        writer.write_int_arg(start);
        writer.write_int_arg(self.fetch_size);
        writer.write_byte_arg(0);
        writer.write_int_arg(0);

        let mut response = session.send_request().await?;
        self.window.clear();
        self.fill(start, response.body())?;
        Ok(())
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("handle", &self.handle)
            .field("position", &self.position)
            .field("result_count", &self.result_count)
            .field("fetched", &self.fetched)
            .field("buffered", &self.window.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};
    use cubrid_protocol::{ColumnType, DataType, Oid};

    fn int_columns() -> Arc<[ColumnMetadata]> {
        vec![ColumnMetadata::new("n", ColumnType::scalar(DataType::Int))].into()
    }

    fn batch(values: &[i32]) -> ResponseReader {
        let mut buf = BytesMut::new();
        buf.put_i32(values.len() as i32);
        for (i, v) in values.iter().enumerate() {
            buf.put_i32(i as i32 + 1);
            buf.put_slice(&Oid::default().0);
            buf.put_i32(4);
            buf.put_i32(*v);
        }
        ResponseReader::new(buf.freeze())
    }

    #[test]
    fn test_fill_tracks_fetched_count() {
        let mut cursor = Cursor::new(3, 10, int_columns(), false, 0, 1);
        let read = cursor.fill(1, &mut batch(&[10, 20, 30])).unwrap();
        assert_eq!(read, 3);
        assert_eq!(cursor.fetched_count(), 3);
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.result_count(), 10);

        let first = cursor.window.front().unwrap();
        assert!(first.oid().is_none());
        assert_eq!(first.get::<i32>(0).unwrap(), 10);
    }

    #[test]
    fn test_negative_result_count_is_empty() {
        let cursor = Cursor::new(3, -1, int_columns(), false, 0, 1);
        assert_eq!(cursor.result_count(), 0);
    }
}
