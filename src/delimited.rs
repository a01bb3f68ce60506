/// Minimal delimited-text reading and writing with RFC 4180 style quoting
///
/// Match names come from free-text exports and may contain commas, quotes or
/// line breaks, so fields are quoted on output and quoted records may span
/// several physical lines on input.
use std::io::{BufRead, Write};

use anyhow::{bail, Result};

/// Guess the delimiter of a header line: tab wins if present, otherwise comma
pub fn detect_delimiter(header: &str) -> char {
    if header.contains('\t') {
        '\t'
    } else {
        ','
    }
}

fn needs_quoting(field: &str, delimiter: char) -> bool {
    field.contains(delimiter) || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Write one record followed by a newline
pub fn write_record<W: Write + ?Sized, S: AsRef<str>>(out: &mut W, fields: &[S], delimiter: char) -> Result<()> {
    let mut line = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            line.push(delimiter);
        }
        let field = field.as_ref();
        if needs_quoting(field, delimiter) {
            line.push('"');
            line.push_str(&field.replace('"', "\"\""));
            line.push('"');
        } else {
            line.push_str(field);
        }
    }
    writeln!(out, "{line}")?;
    Ok(())
}

/// Split one complete record into fields.
/// Returns None when a quoted field is still open at the end of the text.
fn split_record(text: &str, delimiter: char) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(ch);
            }
        } else if ch == '"' {
            in_quotes = true;
        } else if ch == delimiter {
            fields.push(std::mem::take(&mut field));
        } else {
            field.push(ch);
        }
    }

    if in_quotes {
        return None;
    }
    fields.push(field);
    Some(fields)
}

/// Reads records, joining physical lines while a quoted field is open
pub struct RecordReader<R: BufRead> {
    reader: R,
    delimiter: char,
    detect: bool,
    line_no: usize,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R, delimiter: char) -> Self {
        RecordReader {
            reader,
            delimiter,
            detect: false,
            line_no: 0,
        }
    }

    /// Pick the delimiter from the first non-blank line
    pub fn detecting(reader: R) -> Self {
        RecordReader {
            detect: true,
            ..Self::new(reader, ',')
        }
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Next non-blank record and the line number it started on
    pub fn next_record(&mut self) -> Result<Option<(usize, Vec<String>)>> {
        let mut text = String::new();
        let mut start_line = 0;

        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                if text.is_empty() {
                    return Ok(None);
                }
                bail!("line {start_line}: unterminated quoted field");
            }
            self.line_no += 1;

            if text.is_empty() {
                let trimmed = line.trim_end_matches(['\n', '\r']);
                if trimmed.trim().is_empty() {
                    continue;
                }
                start_line = self.line_no;
                if self.detect {
                    self.delimiter = detect_delimiter(trimmed);
                    self.detect = false;
                }
            }
            // Line endings inside an open quote belong to the field
            text.push_str(&line);

            let record = text.strip_suffix('\n').unwrap_or(&text);
            let record = record.strip_suffix('\r').unwrap_or(record);
            if let Some(fields) = split_record(record, self.delimiter) {
                return Ok(Some((start_line, fields)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_split_plain_and_quoted() {
        assert_eq!(
            split_record("a,b,,c", ','),
            Some(vec!["a".into(), "b".into(), "".into(), "c".into()])
        );
        assert_eq!(
            split_record("\"Smith, John\",7,\"say \"\"hi\"\"\"", ','),
            Some(vec!["Smith, John".into(), "7".into(), "say \"hi\"".into()])
        );
        assert_eq!(split_record("\"open,1", ','), None);
        assert_eq!(split_record("a\tb", '\t'), Some(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn test_write_then_read_awkward_fields() {
        let fields = ["plain", "with,comma", "with \"quote\"", "two\nlines", ""];
        let mut buf = Vec::new();
        write_record(&mut buf, &fields, ',').unwrap();
        write_record(&mut buf, &["next", "row", "x", "y", "z"], ',').unwrap();

        let mut reader = RecordReader::new(Cursor::new(buf), ',');
        let (line, first) = reader.next_record().unwrap().unwrap();
        assert_eq!(line, 1);
        assert_eq!(first, fields.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        let (line, second) = reader.next_record().unwrap().unwrap();
        assert_eq!(line, 3);
        assert_eq!(second[0], "next");
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_carriage_returns_inside_quotes_survive() {
        let fields = ["crlf\r\ninside", "lone\rreturn", "end"];
        let mut buf = Vec::new();
        write_record(&mut buf, &fields, '\t').unwrap();

        let mut reader = RecordReader::new(Cursor::new(buf), '\t');
        let (_, record) = reader.next_record().unwrap().unwrap();
        assert_eq!(record, fields.iter().map(|s| s.to_string()).collect::<Vec<_>>());

        // Record terminators themselves are still stripped in CRLF files
        let mut reader = RecordReader::new(Cursor::new("a,b\r\n\"x\r\ny\",z\r\n"), ',');
        assert_eq!(reader.next_record().unwrap(), Some((1, vec!["a".into(), "b".into()])));
        assert_eq!(
            reader.next_record().unwrap(),
            Some((2, vec!["x\r\ny".into(), "z".into()]))
        );
        assert_eq!(reader.next_record().unwrap(), None);
    }

    #[test]
    fn test_blank_lines_skipped_and_unterminated_rejected() {
        let mut reader = RecordReader::new(Cursor::new("\n\na,b\n\n"), ',');
        assert_eq!(reader.next_record().unwrap(), Some((3, vec!["a".into(), "b".into()])));
        assert_eq!(reader.next_record().unwrap(), None);

        let mut reader = RecordReader::new(Cursor::new("\"never closed,1\n"), ',');
        assert!(reader.next_record().is_err());
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("Match Name\tChromosome"), '\t');
        assert_eq!(detect_delimiter("Match Name,Chromosome"), ',');

        let mut reader = RecordReader::detecting(Cursor::new("a\tb,c\n1\t2,3\n"));
        assert_eq!(reader.next_record().unwrap(), Some((1, vec!["a".into(), "b,c".into()])));
        assert_eq!(reader.delimiter(), '\t');
        assert_eq!(reader.next_record().unwrap(), Some((2, vec!["1".into(), "2,3".into()])));
    }
}
