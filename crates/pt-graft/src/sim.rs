//! Simulated guest for unit tests.
//!
//! Frames live in a map keyed by physical frame. Translation walks the guest
//! tables like the CPU does, but goes through a model of a hypervisor's shadow
//! paging structures first:
//!
//! - every table reached by a successful walk gets a shadow whose role is the
//!   write permission inherited from the levels above it;
//! - every `(table, index)` a successful walk used is linked in the shadow;
//! - an access whose whole path is linked is decided by the shadow alone.
//!
//! With [`Mmu::Correct`] a shadow is only used while its role matches the
//! permission inherited on the current path. [`Mmu::StaleInheritedAccess`]
//! keeps the role from the first walk that reached a table, which is the
//! defect the probe looks for.

use alloc::{
    boxed::Box,
    collections::{BTreeMap, BTreeSet},
    vec::Vec,
};
use core::cell::Cell;
use core::ops::ControlFlow;

use x86_64::{
    PhysAddr, VirtAddr,
    structures::{
        idt::PageFaultErrorCode,
        paging::{PageTable, PageTableFlags, PhysFrame, page_table::PageTableEntry},
    },
};

use crate::bootstrap;
use crate::engine::{Engine, GuestAccess, Stage};
use crate::entry::EntryExt;
use crate::fault::FaultRecord;
use crate::memory::{ENTRY_COUNT, PAGE_SIZE, PagingLevels, PagingMemory, slot_size};
use crate::verdict::Verdict;

/// First frame handed out by the simulated allocator.
const FIRST_FRAME: u64 = 0x10_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mmu {
    Correct,
    StaleInheritedAccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read(VirtAddr),
    Write(VirtAddr),
}

/// Engine stage and log count when an access was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    pub stage: Stage,
    pub log_records: usize,
}

std::thread_local! {
    static LOG_RECORDS: Cell<usize> = const { Cell::new(0) };
}

/// Counts records per thread, so parallel tests do not see each other.
struct CountingLogger;

impl log::Log for CountingLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, _record: &log::Record) {
        LOG_RECORDS.with(|count| count.set(count.get() + 1));
    }

    fn flush(&self) {}
}

static LOGGER: CountingLogger = CountingLogger;
static INSTALL_LOGGER: std::sync::Once = std::sync::Once::new();

/// Log records emitted so far on this thread.
pub fn log_records() -> usize {
    LOG_RECORDS.with(Cell::get)
}

/// One entry used by a walk.
#[derive(Debug, Clone)]
pub struct Step {
    pub level: u8,
    pub table: PhysFrame,
    pub index: usize,
    pub entry: PageTableEntry,
}

pub struct SimGuest<'e> {
    engine: &'e Engine,
    mmu: Mmu,
    levels: PagingLevels,
    root: PhysFrame,
    frames: BTreeMap<PhysFrame, Box<PageTable>>,
    next_frame: u64,
    allocations: usize,
    fail_allocations: bool,
    poison_next: bool,
    links: BTreeSet<(PhysFrame, usize)>,
    roles: BTreeMap<PhysFrame, bool>,
    accesses: Vec<Access>,
    marks: Vec<Mark>,
    last_fault: Option<FaultRecord>,
}

impl<'e> SimGuest<'e> {
    /// A guest running on the bootstrap hierarchy.
    pub fn new(engine: &'e Engine, mmu: Mmu, levels: PagingLevels) -> Self {
        INSTALL_LOGGER.call_once(|| {
            if log::set_logger(&LOGGER).is_ok() {
                log::set_max_level(log::LevelFilter::Trace);
            }
        });

        let mut guest = Self {
            engine,
            mmu,
            levels,
            root: PhysFrame::containing_address(PhysAddr::zero()),
            frames: BTreeMap::new(),
            next_frame: FIRST_FRAME,
            allocations: 0,
            fail_allocations: false,
            poison_next: false,
            links: BTreeSet::new(),
            roles: BTreeMap::new(),
            accesses: Vec::new(),
            marks: Vec::new(),
            last_fault: None,
        };
        guest.root = bootstrap::build(&mut guest, levels).expect("bootstrap allocation failed");
        guest
    }

    pub fn allocations(&self) -> usize {
        self.allocations
    }

    pub fn accesses(&self) -> &Vec<Access> {
        &self.accesses
    }

    /// One [`Mark`] per entry of [`accesses`](Self::accesses).
    pub fn marks(&self) -> &[Mark] {
        &self.marks
    }

    pub fn last_fault(&self) -> Option<FaultRecord> {
        self.last_fault
    }

    pub fn fail_allocations(&mut self) {
        self.fail_allocations = true;
    }

    /// Fill the next allocated region with present entries.
    pub fn poison_next_allocation(&mut self) {
        self.poison_next = true;
    }

    /// Map a 1 GiB page into `slot` of the level-3 table under slot 0.
    pub fn map_landmark_slot(&mut self, slot: usize) {
        let mut table = self.root;
        for _ in 3..self.levels.root_level() {
            table = self.table(table)[0].next_table().unwrap();
        }
        self.table_mut(table)[slot].set_addr(
            PhysAddr::new(slot as u64 * slot_size(3)),
            PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::HUGE_PAGE,
        );
    }

    /// Store `value` at `addr` without going through the MMU model.
    pub fn poke(&mut self, addr: VirtAddr, value: u32) {
        let path = self.path(addr).unwrap();
        let phys = Self::physical(&path, addr);
        *self.word_mut(phys) = value;
    }

    /// Entries the CPU uses to translate `addr`, root first.
    ///
    /// `None` if a non-present entry is reached.
    pub fn path(&self, addr: VirtAddr) -> Option<Vec<Step>> {
        let mut steps = Vec::new();
        let mut table = self.root;
        let mut level = self.levels.root_level();

        loop {
            let index = ((addr.as_u64() / slot_size(level)) % ENTRY_COUNT as u64) as usize;
            let entry = self.table(table)[index].clone();
            if !entry.is_present() {
                return None;
            }

            let leaf = level == 1 || entry.flags().contains(PageTableFlags::HUGE_PAGE);
            steps.push(Step {
                level,
                table,
                index,
                entry: entry.clone(),
            });
            if leaf {
                return Some(steps);
            }

            table = entry.next_table().ok()?;
            level -= 1;
        }
    }

    fn physical(path: &[Step], addr: VirtAddr) -> PhysAddr {
        let leaf = &path[path.len() - 1];
        leaf.entry.addr() + addr.as_u64() % slot_size(leaf.level)
    }

    fn word_mut(&mut self, phys: PhysAddr) -> &mut u32 {
        let frame = PhysFrame::containing_address(phys);
        let table = self
            .frames
            .get_mut(&frame)
            .expect("access outside simulated frames");
        let words = unsafe { &mut *(&mut **table as *mut PageTable as *mut [u32; 1024]) };
        &mut words[(phys.as_u64() % PAGE_SIZE) as usize / 4]
    }

    /// Write permission according to the shadow, if the whole path is linked.
    fn shadow_writable(&self, path: &[Step]) -> Option<bool> {
        let mut inherited = true;
        for step in path {
            if !self.links.contains(&(step.table, step.index)) {
                return None;
            }
            let role = *self.roles.get(&step.table)?;
            if self.mmu == Mmu::Correct && role != inherited {
                return None;
            }
            inherited = role && step.entry.writable() == Some(true);
        }
        Some(inherited)
    }

    fn link(&mut self, path: &[Step]) {
        let mut inherited = true;
        for step in path {
            let role = match self.mmu {
                Mmu::Correct => {
                    self.roles.insert(step.table, inherited);
                    inherited
                }
                Mmu::StaleInheritedAccess => *self.roles.entry(step.table).or_insert(inherited),
            };
            self.links.insert((step.table, step.index));
            inherited = role && step.entry.writable() == Some(true);
        }
    }

    fn translate(&mut self, addr: VirtAddr, write: bool) -> Result<PhysAddr, FaultRecord> {
        self.accesses.push(if write {
            Access::Write(addr)
        } else {
            Access::Read(addr)
        });
        self.marks.push(Mark {
            stage: self.engine.stage(),
            log_records: log_records(),
        });

        let write_bit = if write {
            PageFaultErrorCode::CAUSED_BY_WRITE
        } else {
            PageFaultErrorCode::empty()
        };

        let Some(path) = self.path(addr) else {
            return Err(FaultRecord::new(addr, write_bit));
        };

        let shadow = self.shadow_writable(&path);
        let writable = shadow
            .unwrap_or_else(|| path.iter().all(|step| step.entry.writable() == Some(true)));
        if write && !writable {
            return Err(FaultRecord::new(
                addr,
                write_bit | PageFaultErrorCode::PROTECTION_VIOLATION,
            ));
        }

        if shadow.is_none() {
            self.link(&path);
        }
        Ok(Self::physical(&path, addr))
    }

    fn deliver(&mut self, fault: FaultRecord) -> Verdict {
        self.last_fault = Some(fault);
        self.engine.resolve_fault(&fault)
    }
}

impl PagingMemory for SimGuest<'_> {
    fn root(&self) -> PhysFrame {
        self.root
    }

    fn table(&self, frame: PhysFrame) -> &PageTable {
        self.frames.get(&frame).expect("table outside simulated frames")
    }

    fn table_mut(&mut self, frame: PhysFrame) -> &mut PageTable {
        self.frames
            .get_mut(&frame)
            .expect("table outside simulated frames")
    }

    fn allocate_region(&mut self, pages: usize) -> Option<PhysFrame> {
        if self.fail_allocations {
            return None;
        }

        let start = PhysFrame::containing_address(PhysAddr::new(self.next_frame));
        for page in 0..pages as u64 {
            let mut table = Box::new(PageTable::new());
            if self.poison_next {
                for entry in table.iter_mut() {
                    entry.set_addr(
                        PhysAddr::new(0xdead_b000),
                        PageTableFlags::PRESENT | PageTableFlags::WRITABLE,
                    );
                }
            }
            self.frames.insert(start + page, table);
        }

        self.poison_next = false;
        self.next_frame += pages as u64 * PAGE_SIZE;
        self.allocations += 1;
        Some(start)
    }
}

impl GuestAccess for SimGuest<'_> {
    fn read(&mut self, addr: VirtAddr) -> ControlFlow<Verdict, u32> {
        match self.translate(addr, false) {
            Ok(phys) => ControlFlow::Continue(*self.word_mut(phys)),
            Err(fault) => ControlFlow::Break(self.deliver(fault)),
        }
    }

    fn write(&mut self, addr: VirtAddr, value: u32) -> ControlFlow<Verdict> {
        match self.translate(addr, true) {
            Ok(phys) => {
                *self.word_mut(phys) = value;
                ControlFlow::Continue(())
            }
            Err(fault) => ControlFlow::Break(self.deliver(fault)),
        }
    }
}
