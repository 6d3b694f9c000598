use anyhow::Result;
use clap::Args as ClapArgs;
use rand::RngCore;

use recordvault_core::crypto::KEY_SIZE;

#[derive(ClapArgs)]
pub struct Args {
    /// Number of keys to print
    #[arg(default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=1024))]
    pub count: u32,
}

pub fn execute(args: &Args) -> Result<()> {
    let mut rng = rand::rng();
    for _ in 0..args.count {
        let mut key = [0u8; KEY_SIZE];
        rng.fill_bytes(&mut key);
        println!("{}", hex::encode(key));
    }
    Ok(())
}
