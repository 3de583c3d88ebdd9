//! FORTRAN-77 subroutine text buffers
//!
//! A `Subroutine` collects declarations, PARAMETER definitions and body
//! statements, and renders them as fixed-form FORTRAN: statements start at
//! column 9, lines wrap at column 72 and continue with an `&` in column 6.

use std::fmt;

/// Source lines wrap at this column
pub const WRAP_COLUMN: usize = 72;

const STMT_MARGIN: &str = "        ";
const HEADER_MARGIN: &str = "      ";
const CONTINUATION: &str = "     &    ";

/// Append `stmt` to `out` with the given margin, wrapping at [`WRAP_COLUMN`]
///
/// The break point is the last blank on the line; if none lies past the
/// margin, the first blank after the limit is used, and an unbreakable line
/// is emitted as-is.
fn append_wrapped(out: &mut String, stmt: &str, margin: &str) {
    let mut line = format!("{margin}{stmt}");
    loop {
        if line.len() <= WRAP_COLUMN {
            out.push_str(&line);
            out.push('\n');
            return;
        }
        let bytes = line.as_bytes();
        let p = match bytes[..=WRAP_COLUMN].iter().rposition(|&b| b == b' ') {
            Some(i) if i >= CONTINUATION.len() => Some(i),
            _ => bytes[WRAP_COLUMN..]
                .iter()
                .position(|&b| b == b' ')
                .map(|j| WRAP_COLUMN + j),
        };
        let p = match p {
            Some(i) => i,
            None => {
                out.push_str(&line);
                out.push('\n');
                return;
            }
        };
        out.push_str(&line[..p]);
        out.push('\n');
        line = format!("{CONTINUATION}{}", &line[p + 1..]);
    }
}

/// Append a comma-separated block (declaration or PARAMETER list)
fn assemble_block(out: &mut String, head: &str, items: &[String], tail: &str) {
    if items.is_empty() {
        return;
    }
    let mut line = String::from(head);
    let mut first = true;
    for item in items {
        if !first {
            if line.len() + item.len() + 3 > WRAP_COLUMN {
                line.push(',');
                out.push_str(&line);
                out.push('\n');
                line = String::from(CONTINUATION);
            } else {
                line.push_str(", ");
            }
        }
        line.push_str(item);
        first = false;
    }
    line.push_str(tail);
    out.push_str(&line);
    out.push('\n');
}

/// A FORTRAN subroutine under assembly
///
/// Model-function buffers use the standard calling convention
/// `(t, x, <out>, p, q, rwh, iwh, iflag)`; the plot buffer uses the extended
/// one expected by the solver's trajectory writer.
#[derive(Debug, Clone)]
pub struct Subroutine {
    name: String,
    /// Output argument; `None` selects the plot calling convention
    output: Option<String>,
    decls: Vec<String>,
    consts: Vec<String>,
    body: String,
}

impl Subroutine {
    /// A model-function buffer writing into the array argument `output`
    pub fn new(name: impl Into<String>, output: impl Into<String>) -> Self {
        Subroutine {
            name: name.into(),
            output: Some(output.into()),
            decls: Vec::new(),
            consts: Vec::new(),
            body: String::new(),
        }
    }

    /// A plot-function buffer
    pub fn plot(name: impl Into<String>) -> Self {
        Subroutine {
            name: name.into(),
            output: None,
            decls: Vec::new(),
            consts: Vec::new(),
            body: String::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a local REAL*8 variable
    ///
    /// Duplicates and the output argument itself are suppressed.
    pub fn declare(&mut self, var: &str) {
        if self.output.as_deref() == Some(var) {
            return;
        }
        if self.decls.iter().any(|d| d == var) {
            return;
        }
        self.decls.push(var.to_string());
    }

    /// Add a definition to the PARAMETER block
    pub fn define_const(&mut self, definition: String) {
        self.consts.push(definition);
    }

    /// Append a body statement
    pub fn stmt(&mut self, stmt: &str) {
        append_wrapped(&mut self.body, stmt, STMT_MARGIN);
    }

    /// Append a labeled body statement (FORMAT and friends)
    pub fn numbered_stmt(&mut self, label: u32, stmt: &str) {
        append_wrapped(&mut self.body, stmt, &format!("{label:<8}"));
    }

    /// Append a comment line
    pub fn comment(&mut self, text: &str) {
        self.body.push_str("C       ");
        self.body.push_str(text);
        self.body.push('\n');
    }
}

impl fmt::Display for Subroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        match &self.output {
            Some(var) => {
                append_wrapped(
                    &mut out,
                    &format!(
                        "SUBROUTINE {}(t, x, {}, p, q, rwh, iwh, iflag)",
                        self.name, var
                    ),
                    HEADER_MARGIN,
                );
                out.push_str("        IMPLICIT NONE\n");
                append_wrapped(
                    &mut out,
                    &format!("REAL*8 t, x(*), {}(*), p(*), q(*), rwh(*)", var),
                    STMT_MARGIN,
                );
                out.push_str("        INTEGER*4 iwh(*), iflag\n");
            }
            None => {
                append_wrapped(
                    &mut out,
                    &format!(
                        "SUBROUTINE {}(t, x, p, q, rwh, iwh, iflag, xd, nxd, wron, gq, \
                         gaq)",
                        self.name
                    ),
                    HEADER_MARGIN,
                );
                out.push_str("        IMPLICIT NONE\n");
                out.push_str("        INTEGER*4 nxd, iwh(*), iflag\n");
                append_wrapped(
                    &mut out,
                    "REAL*8 t, x(*), p(*), q(*), rwh(*), xd(nxd,*), wron(nxd,nxd), \
                     gq(*), gaq(*)",
                    STMT_MARGIN,
                );
            }
        }
        assemble_block(&mut out, "        REAL*8 ", &self.decls, "");
        assemble_block(&mut out, "        PARAMETER (", &self.consts, ")");
        out.push_str(&self.body);
        out.push_str("      END\n");
        f.write_str(&out)
    }
}
