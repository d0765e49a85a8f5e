use rtumod_tools::common::{parse_bool, parse_parity};

fn main() {
    for sample in ["true", "0", "on", "off", "yes", "no"] {
        println!("{sample} => {:?}", parse_bool(sample));
    }
    for sample in ["none", "even", "odd", "mark"] {
        println!("{sample} => {:?}", parse_parity(sample));
    }
}
