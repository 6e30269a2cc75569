//! Physical layout and tunables for QEMU's `virt` machine
//!
//! Unlike the Raspberry Pi snapshots this workspace also carries, `virt` has a single, fixed
//! memory map: there is no need to discover it at runtime from a device tree, so this is a plain
//! table of constants.

/// Base of DRAM
pub const PHY_START: u64 = 0x4000_0000;
/// First byte past the end of the 128 MiB DRAM region
pub const PHYSTOP: u64 = PHY_START + 0x0800_0000;

/// Base of the GICv2 distributor's device region
pub const DEVBASE1: u64 = 0x0800_0000;
/// Base of the PL011 UART's device region
pub const DEVBASE2: u64 = 0x0900_0000;
/// Base of the SP804 timers' device region
pub const DEVBASE3: u64 = 0x0a00_0000;
/// Size of each of the three device regions above
pub const DEV_MEM_SZ: u64 = 0x0100_0000;

/// PL011 UART base address
pub const UART0: u64 = 0x0900_0000;
/// UART reference clock, in Hz
pub const UART_CLK: u64 = 24_000_000;

/// SP804 timer 0/1 base address
pub const TIMER0: u64 = 0x1c11_0000;
/// SP804 timer 2/3 base address
pub const TIMER1: u64 = 0x1c12_0000;
/// SP804 input clock, in Hz
pub const CLK_HZ: u64 = 1_000_000;

/// GICv2 distributor base address
pub const VIC_BASE: u64 = 0x0800_0000;
/// Offset of the CPU interface register block from the distributor base
pub const GICC_OFFSET: u64 = 0x0001_0000;

/// First SGI interrupt number
pub const GICD_INTNO_SGIO: u32 = 0;
/// First PPI interrupt number
pub const GICD_INTNO_PPIO: u32 = 16;
/// First SPI interrupt number
pub const GICD_INTNO_SPIO: u32 = 32;

/// IRQ number for the SP804 timer 0/1 pair
pub const PIC_TIMER01: u32 = GICD_INTNO_SPIO + 13;
/// IRQ number for the SP804 timer 2/3 pair
pub const PIC_TIMER23: u32 = GICD_INTNO_SPIO + 11;
/// IRQ number for the PL011 UART
pub const PIC_UART0: u32 = GICD_INTNO_SPIO + 1;
/// IRQ number for the virtio-gpu framebuffer
pub const PIC_GRAPHIC: u32 = GICD_INTNO_SPIO + 19;
/// IRQ number for the ARMv8 virtual generic timer
pub const PIC_VTIMER: u32 = GICD_INTNO_PPIO + 11;

/// Number of interrupt sources a GICv2 exposes on `virt`
pub const NUM_INTSRC_GIC: usize = 64;
/// Number of interrupt sources a legacy PL190 exposes
pub const NUM_INTSRC_PIC: usize = 32;

/// Default scheduling tick rate, in Hz
pub const HZ: u64 = 100;

/// Base of the kernel's linear map of physical memory
pub const KERNBASE: u64 = 0xFFFF_FFFF_0000_0000;
/// Size of the initial identity-mapped region set up before the MMU is enabled
pub const INIT_KERN_SZ: u64 = 0x0020_0000;
/// Physical extent mapped by the boot-time identity map, used until the heap is initialized
pub const INIT_KERNMAP: u64 = PHY_START + INIT_KERN_SZ * 8;

/// Translates a physical address in `[PHY_START, PHYSTOP)` to its kernel virtual alias
pub const fn p2v(phys: u64) -> u64 {
    phys + KERNBASE
}

/// Translates a kernel virtual alias back to its physical address
pub const fn v2p(virt: u64) -> u64 {
    virt - KERNBASE
}
