//! Clock bring-up for the command-link board.
//!
//! The only hard constraint this crate's clock tree has to satisfy is
//! USB OTG FS, which needs a 48 MHz clock regardless of what runs on top
//! of it (§6's transport is USB CDC-ACM). Everything else here just picks
//! a sensible `SYSCLK` off the same PLL rather than running a second one.

use embassy_stm32::rcc::*;
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::Config;

/// External crystal on this board.
const HSE_HZ: u32 = 8_000_000;

pub struct Board {
    pub p: embassy_stm32::Peripherals,
}

impl Board {
    /// Configures the PLL from the 8 MHz HSE crystal: `/4` prediv, `x168`
    /// mul gives a 336 MHz VCO, then `P/2` = 168 MHz for `SYSCLK` and
    /// `Q/7` = 48 MHz for the USB OTG FS peripheral `usb::init` depends on.
    pub fn init() -> Self {
        let mut config = Config::default();
        config.rcc.hse = Some(Hse {
            freq: TimeHertz(HSE_HZ),
            mode: HseMode::Oscillator,
        });
        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL168,
            divp: Some(PllPDiv::DIV2), // SYSCLK = 168 MHz
            divq: Some(PllQDiv::DIV7), // USB OTG FS requires exactly 48 MHz
            divr: None,
        });
        config.rcc.sys = Sysclk::PLL1_P;
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;

        let p = embassy_stm32::init(config);

        Self { p }
    }
}
