use std::io;
use std::io::Write;

/// The per-thread-count measurements of one chain.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadReport {
    /// Whether the branch-and-bound pipeline ran to exhaustion.
    pub bnb_bnb_finished: bool,
    /// B&B solver with the B&B scheduler.
    pub bnb_bnb_makespan: usize,
    /// B&B solver with the list scheduler.
    pub bnb_list_makespan: usize,
    /// DP solver alone.
    pub dp_makespan: usize,
    /// DP solver with the B&B scheduling post-pass.
    pub dp_bnb_makespan: usize,
}

/// Streams one CSV row per solved chain. The column block repeats per
/// thread count up to the longest configured chain; shorter chains
/// leave the surplus cells empty.
#[derive(Debug)]
pub struct CsvReport<W: Write> {
    out: W,
    max_threads: usize,
}

impl<W: Write> CsvReport<W> {
    pub fn new(mut out: W, max_threads: usize) -> io::Result<CsvReport<W>> {
        write!(out, "length,id")?;
        for t in 1..=max_threads {
            write!(
                out,
                ",BnB_BnB_finished_{t},BnB_BnB_makespan_{t},BnB_List_makespan_{t}\
                 ,DP_makespan_{t},DP_BnB_makespan_{t}"
            )?;
        }
        writeln!(out)?;

        Ok(CsvReport { out, max_threads })
    }

    pub fn write_row(
        &mut self,
        length: usize,
        id: usize,
        reports: &[ThreadReport],
    ) -> io::Result<()> {
        write!(self.out, "{length},{id}")?;

        for report in reports {
            write!(
                self.out,
                ",{},{},{},{},{}",
                u8::from(report.bnb_bnb_finished),
                report.bnb_bnb_makespan,
                report.bnb_list_makespan,
                report.dp_makespan,
                report.dp_bnb_makespan
            )?;
        }
        for _ in reports.len()..self.max_threads {
            write!(self.out, ",,,,,")?;
        }
        writeln!(self.out)?;

        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_repeats_the_column_block_per_thread_count() {
        let mut buffer = Vec::new();
        let _ = CsvReport::new(&mut buffer, 2).unwrap();
        let header = String::from_utf8(buffer).unwrap();

        assert_eq!(
            header.trim_end(),
            "length,id,BnB_BnB_finished_1,BnB_BnB_makespan_1,BnB_List_makespan_1\
             ,DP_makespan_1,DP_BnB_makespan_1,BnB_BnB_finished_2,BnB_BnB_makespan_2\
             ,BnB_List_makespan_2,DP_makespan_2,DP_BnB_makespan_2"
        );
    }

    #[test]
    fn short_chains_pad_their_row() {
        let mut buffer = Vec::new();
        {
            let mut report = CsvReport::new(&mut buffer, 2).unwrap();
            report
                .write_row(
                    1,
                    0,
                    &[ThreadReport {
                        bnb_bnb_finished: true,
                        bnb_bnb_makespan: 10,
                        bnb_list_makespan: 11,
                        dp_makespan: 12,
                        dp_bnb_makespan: 12,
                    }],
                )
                .unwrap();
        }
        let contents = String::from_utf8(buffer).unwrap();
        let row = contents.lines().nth(1).unwrap();

        assert_eq!(row, "1,0,1,10,11,12,12,,,,,");
    }
}
