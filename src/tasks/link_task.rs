use embassy_executor::task;
use embassy_time::{Duration, Timer};

use mcu_link::{CommandCore, RingTransport, Shutdown};

use crate::usb::UsbSerial;

/// Bytes buffered between USB packets and the frame layer. Generous
/// relative to the 64-byte max frame so a handful of queued frames don't
/// stall the link.
const RING_CAPACITY: usize = 256;

static SHUTDOWN: Shutdown = Shutdown::new();

/// Drives the protocol core over the USB CDC-ACM link: feeds received
/// packets into a [`RingTransport`], calls [`CommandCore::poll`] once per
/// packet, and flushes whatever the core queued in response. Grounded in
/// the teacher's `crsf_task` shape (read whatever arrived, hand it to a
/// parser, loop) with the CRSF-specific parsing replaced by the framed
/// command protocol.
#[task]
pub async fn link_task(mut usb_serial: UsbSerial<'static>) {
    let mut transport: RingTransport<RING_CAPACITY> = RingTransport::new();
    let mut core = CommandCore::new(&mcu_link::commands::SCHEMA);
    let mut rx_buf = [0u8; 64];
    let mut tx_buf = [0u8; RING_CAPACITY];

    loop {
        usb_serial.wait_connection().await;
        defmt::info!("link: host connected");

        loop {
            let n = match usb_serial.read_packet(&mut rx_buf).await {
                Ok(n) => n,
                Err(_) => {
                    defmt::warn!("link: host disconnected");
                    break;
                }
            };
            if n == 0 {
                continue;
            }
            transport.feed_input(&rx_buf[..n]);

            // One poll drains at most one frame (§5); a backlog of
            // several queued frames is drained over successive packets
            // rather than blocking this task.
            core.poll(&mut transport, &SHUTDOWN);

            let out_len = transport.drain_output(&mut tx_buf);
            if out_len > 0 && usb_serial.write_packet(&tx_buf[..out_len]).await.is_err() {
                defmt::warn!("link: write failed, host likely disconnected");
                break;
            }
        }

        Timer::after(Duration::from_millis(100)).await;
    }
}
