//! Multivariate-to-univariate index reduction.
//!
//! A p-variable model observed over `horizon` periods is flattened into a
//! scalar pseudo-process. Pseudo-time `s` walks the `(pos, var)` pairs in
//! row-major order: all variables of period 0, then period 1, and so on.
//!
//! ```text
//! dense  (FullM2uMap):  s = pos * p + var        (every pair present)
//! sparse (M2uMap):      s = rank of (pos, var)   (only listed pairs)
//! ```
//!
//! A sparse map built by scanning keeps one gap pseudo-time for every
//! period with no loaded cell, on that period's last variable. The gap
//! carries no observation but still closes its period, so the period's
//! transition is applied.

use std::collections::HashMap;

use crate::data::MSsfData;
use crate::error::{check_index, Result, SsfError};
use crate::multivariate::MultivariateSsf;

/// One `(true time, variable)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct M2uEntry {
    pub pos: usize,
    pub var: usize,
}

impl M2uEntry {
    pub fn new(pos: usize, var: usize) -> Self {
        Self { pos, var }
    }
}

/// Bijection between pseudo-time and `(pos, var)` pairs.
pub trait MuMap {
    /// Pair observed at pseudo-time `s`.
    fn entry(&self, s: usize) -> Result<M2uEntry>;

    /// Pseudo-time of `entry`.
    fn pseudo_time(&self, entry: M2uEntry) -> Result<usize>;

    /// Number of pseudo-times.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn vars_count(&self) -> usize;

    /// Number of true periods covered.
    fn horizon(&self) -> usize;

    /// Whether `s` stands for a period without any observation.
    fn is_gap(&self, s: usize) -> Result<bool> {
        self.entry(s).map(|_| false)
    }

    /// Whether `s` is the last pseudo-time of its period.
    fn is_step_end(&self, s: usize) -> Result<bool> {
        let current = self.entry(s)?;
        if s + 1 == self.len() {
            return Ok(true);
        }
        Ok(self.entry(s + 1)?.pos != current.pos)
    }
}

impl<M: MuMap + ?Sized> MuMap for &M {
    fn entry(&self, s: usize) -> Result<M2uEntry> {
        (**self).entry(s)
    }

    fn pseudo_time(&self, entry: M2uEntry) -> Result<usize> {
        (**self).pseudo_time(entry)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn vars_count(&self) -> usize {
        (**self).vars_count()
    }

    fn horizon(&self) -> usize {
        (**self).horizon()
    }

    fn is_gap(&self, s: usize) -> Result<bool> {
        (**self).is_gap(s)
    }

    fn is_step_end(&self, s: usize) -> Result<bool> {
        (**self).is_step_end(s)
    }
}

/// Dense map: every variable at every period, computed in O(1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullM2uMap {
    nvars: usize,
    horizon: usize,
}

impl FullM2uMap {
    pub fn new(nvars: usize, horizon: usize) -> Self {
        Self { nvars, horizon }
    }
}

impl MuMap for FullM2uMap {
    fn entry(&self, s: usize) -> Result<M2uEntry> {
        check_index("pseudo-time", s, self.len())?;
        Ok(M2uEntry::new(s / self.nvars, s % self.nvars))
    }

    fn pseudo_time(&self, entry: M2uEntry) -> Result<usize> {
        check_index("position", entry.pos, self.horizon)?;
        check_index("variable", entry.var, self.nvars)?;
        Ok(entry.pos * self.nvars + entry.var)
    }

    fn len(&self) -> usize {
        self.nvars * self.horizon
    }

    fn vars_count(&self) -> usize {
        self.nvars
    }

    fn horizon(&self) -> usize {
        self.horizon
    }

    fn is_step_end(&self, s: usize) -> Result<bool> {
        Ok(self.entry(s)?.var + 1 == self.nvars)
    }
}

/// Sparse map: an explicit table of the pairs that are actually observed.
///
/// Entries are appended in strictly increasing row-major order while the
/// map is open; after [`close`](M2uMap::close) the table is frozen and
/// lookups become available.
#[derive(Debug, Clone, Default)]
pub struct M2uMap {
    nvars: usize,
    entries: Vec<M2uEntry>,
    index: HashMap<M2uEntry, usize>,
    /// Pseudo-times added by `add_gap`, ascending.
    gaps: Vec<usize>,
    closed: bool,
}

impl M2uMap {
    pub fn new(nvars: usize) -> Self {
        Self {
            nvars,
            ..Self::default()
        }
    }

    /// Closed map over every `(pos, var)` with `has_z(pos, var)`, for
    /// `pos < horizon`, plus a gap for each period without any.
    pub fn from_ssf<S: MultivariateSsf + ?Sized>(ssf: &S, horizon: usize) -> Result<Self> {
        Self::scan(ssf.vars_count(), horizon, |pos, var| Ok(ssf.has_z(pos, var)))
    }

    /// Closed map over the pairs that have a loading and a non-missing
    /// observation in `data`, plus a gap for each period without any. The
    /// data length is the horizon.
    pub fn from_data<S, D>(ssf: &S, data: &D) -> Result<Self>
    where
        S: MultivariateSsf + ?Sized,
        D: MSsfData + ?Sized,
    {
        let nvars = ssf.vars_count();
        if data.vars_count() != nvars {
            return Err(SsfError::len("data variables", nvars, data.vars_count()));
        }
        Self::scan(nvars, data.count(), |pos, var| {
            Ok(ssf.has_z(pos, var) && !data.is_missing(var, pos)?)
        })
    }

    /// Closed map over the non-missing cells of `data`, for models that
    /// load every variable.
    pub fn from_observed<D: MSsfData + ?Sized>(data: &D) -> Result<Self> {
        Self::scan(data.vars_count(), data.count(), |pos, var| {
            Ok(!data.is_missing(var, pos)?)
        })
    }

    fn scan(
        nvars: usize,
        horizon: usize,
        mut keep: impl FnMut(usize, usize) -> Result<bool>,
    ) -> Result<Self> {
        let mut map = Self::new(nvars);
        if nvars == 0 {
            map.close();
            return Ok(map);
        }
        for pos in 0..horizon {
            let mut kept = false;
            for var in 0..nvars {
                if keep(pos, var)? {
                    map.add(M2uEntry::new(pos, var))?;
                    kept = true;
                }
            }
            if !kept {
                map.add_gap(pos)?;
            }
        }
        map.close();
        Ok(map)
    }

    /// Appends `entry`, which must come after every entry already present.
    pub fn add(&mut self, entry: M2uEntry) -> Result<()> {
        if self.closed {
            return Err(SsfError::MapClosed);
        }
        check_index("variable", entry.var, self.nvars)?;
        if self.index.contains_key(&entry) {
            return Err(SsfError::DuplicateEntry {
                pos: entry.pos,
                var: entry.var,
            });
        }
        if self.entries.last().is_some_and(|last| *last > entry) {
            return Err(SsfError::OutOfOrder {
                pos: entry.pos,
                var: entry.var,
            });
        }
        self.index.insert(entry, self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    /// Appends a gap for period `pos`, which must come after every period
    /// already present. The gap takes the pair `(pos, nvars - 1)`.
    pub fn add_gap(&mut self, pos: usize) -> Result<()> {
        if self.closed {
            return Err(SsfError::MapClosed);
        }
        check_index("variable", 0, self.nvars)?;
        let entry = M2uEntry::new(pos, self.nvars - 1);
        if self.entries.last().is_some_and(|last| last.pos >= pos) {
            return Err(SsfError::OutOfOrder {
                pos: entry.pos,
                var: entry.var,
            });
        }
        self.gaps.push(self.entries.len());
        self.index.insert(entry, self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        if self.closed {
            return Err(SsfError::MapClosed);
        }
        self.entries.clear();
        self.index.clear();
        self.gaps.clear();
        Ok(())
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            tracing::debug!(
                entries = self.entries.len(),
                gaps = self.gaps.len(),
                nvars = self.nvars,
                "closed sparse m2u map"
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Entries in pseudo-time order, gaps included.
    pub fn entries(&self) -> &[M2uEntry] {
        &self.entries
    }

    /// Entries that carry an observation.
    pub fn observed(&self) -> impl Iterator<Item = M2uEntry> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(s, _)| self.gaps.binary_search(s).is_err())
            .map(|(_, e)| *e)
    }

    pub fn gap_count(&self) -> usize {
        self.gaps.len()
    }

    fn ensure_closed(&self) -> Result<()> {
        if self.closed {
            Ok(())
        } else {
            Err(SsfError::MapNotClosed)
        }
    }
}

impl MuMap for M2uMap {
    fn entry(&self, s: usize) -> Result<M2uEntry> {
        self.ensure_closed()?;
        check_index("pseudo-time", s, self.entries.len())?;
        Ok(self.entries[s])
    }

    fn pseudo_time(&self, entry: M2uEntry) -> Result<usize> {
        self.ensure_closed()?;
        self.index
            .get(&entry)
            .copied()
            .ok_or(SsfError::UndefinedLoading {
                pos: entry.pos,
                var: entry.var,
            })
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn vars_count(&self) -> usize {
        self.nvars
    }

    fn horizon(&self) -> usize {
        self.entries.last().map_or(0, |e| e.pos + 1)
    }

    fn is_gap(&self, s: usize) -> Result<bool> {
        self.entry(s)?;
        Ok(self.gaps.binary_search(&s).is_ok())
    }
}
