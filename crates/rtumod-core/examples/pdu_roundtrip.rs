use rtumod_core::encoding::Reader;
use rtumod_core::frame::rtu;
use rtumod_core::pdu::{ReadRequest, Request, Response};
use rtumod_core::Frame;

fn main() {
    let request = Request::ReadHoldingRegisters(ReadRequest {
        start_address: 0x006B,
        quantity: 2,
    });

    let mut frame = Frame::new();
    frame
        .build(0x11, |w| request.encode(w))
        .expect("request encoding should succeed for valid sample data");
    println!("encoded request frame: {:02X?}", frame.as_bytes());

    let answer = [0x11, 0x03, 0x04, 0x00, 0x2A, 0x00, 0x64, 0x00, 0x00];
    let crc = rtu::compute(&answer[..7]).to_be_bytes();
    let mut framed = answer;
    framed[7] = crc[0];
    framed[8] = crc[1];

    let mut received = Frame::new();
    received
        .copy_from(&framed)
        .expect("sample answer fits in one frame");
    assert!(received.crc_ok(), "sample answer should carry a valid crc");
    let unit_id = received.unit_id().unwrap_or_default();
    let mut r = Reader::new(received.pdu());
    let response = Response::decode(&mut r)
        .expect("response decoding should succeed for valid sample response bytes");

    match response {
        Response::ReadRegisters(resp) => {
            for idx in 0..resp.register_count() {
                println!(
                    "unit {unit_id} register[{idx}] = {}",
                    resp.register(idx).unwrap_or_default()
                );
            }
        }
        other => println!("unexpected response: {other:?}"),
    }
}
