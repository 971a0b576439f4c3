// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use std::io::Write;

const BAR_LENGTH: usize = 60;

/// Single-line upload progress bar, redrawn only when the percentage changes
pub struct ProgressBar<W: Write> {
    out: W,
    last_percent: Option<u8>,
}

impl<W: Write> ProgressBar<W> {
    pub fn new(out: W) -> Self {
        ProgressBar { out, last_percent: None }
    }

    /// Redraw for `fraction` of the upload done. Returns whether anything was drawn.
    pub fn update(&mut self, fraction: f64) -> bool {
        let (fraction, status) = if fraction >= 1.0 {
            (1.0, "Done...\r\n")
        } else {
            (fraction.max(0.0), "")
        };

        let percent = (fraction * 100.0) as u8;
        if self.last_percent == Some(percent) {
            return false;
        }
        self.last_percent = Some(percent);

        // Halves round to even so 7.5% draws 4 cells, not 5
        let block = (BAR_LENGTH as f64 * fraction).round_ties_even() as usize;
        // Progress output is best effort
        let _ = write!(
            self.out,
            "\rUploading: [{}{}] {}% {}",
            "=".repeat(block),
            " ".repeat(BAR_LENGTH - block),
            percent,
            status
        );
        let _ = self.out.flush();
        true
    }

    pub fn done(&mut self) {
        let _ = self.out.write_all(b"\n");
        let _ = self.out.flush();
    }

    #[cfg(test)]
    pub fn last_percent(&self) -> Option<u8> {
        self.last_percent
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered_percents(output: &[u8]) -> Vec<u8> {
        String::from_utf8_lossy(output)
            .split("\rUploading: ")
            .filter(|s| !s.is_empty())
            .map(|s| {
                let after_bar = &s[BAR_LENGTH + 3..];
                let end = after_bar.find('%').unwrap();
                after_bar[..end].parse().unwrap()
            })
            .collect()
    }

    #[test]
    fn test_deduplicates_equal_percentages() {
        let mut bar = ProgressBar::new(Vec::new());
        let total = 1000.0;

        assert!(bar.update(0.0 / total));
        assert!(!bar.update(1.0 / total));
        assert!(bar.update(20.0 / total));
        assert!(bar.update(1000.0 / total));

        assert_eq!(rendered_percents(&bar.into_inner()), vec![0, 2, 100]);
    }

    #[test]
    fn test_renders_fixed_width_bar() {
        let mut bar = ProgressBar::new(Vec::new());
        bar.update(0.5);
        let out = String::from_utf8(bar.into_inner()).unwrap();
        assert_eq!(
            out,
            format!("\rUploading: [{}{}] 50% ", "=".repeat(30), " ".repeat(30))
        );
    }

    #[test]
    fn test_completion_clamps_to_full() {
        let mut bar = ProgressBar::new(Vec::new());
        assert!(bar.update(1.7));
        assert_eq!(bar.last_percent(), Some(100));
        assert!(!bar.update(1.0));

        let out = String::from_utf8(bar.into_inner()).unwrap();
        assert_eq!(out, format!("\rUploading: [{}] 100% Done...\r\n", "=".repeat(60)));
    }

    #[test]
    fn test_done_emits_newline() {
        let mut bar = ProgressBar::new(Vec::new());
        bar.done();
        assert_eq!(bar.into_inner(), b"\n");
    }

    #[test]
    fn test_bar_rounds_halves_to_even() {
        // 60 * 0.075 = 4.5 cells
        let mut bar = ProgressBar::new(Vec::new());
        bar.update(0.075);
        let out = String::from_utf8(bar.into_inner()).unwrap();
        assert_eq!(out, format!("\rUploading: [{}{}] 7% ", "=".repeat(4), " ".repeat(56)));

        // 60 * 0.025 = 1.5 cells
        let mut bar = ProgressBar::new(Vec::new());
        bar.update(0.025);
        let out = String::from_utf8(bar.into_inner()).unwrap();
        assert_eq!(out, format!("\rUploading: [{}{}] 2% ", "=".repeat(2), " ".repeat(58)));
    }
}
