// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

mod lookup;

use ext4_locate::{Locator, OpenOptions};

#[allow(dead_code)]
mod test_util {
    include!("../../src/test_util.rs");
}

/// Open a locator on an in-memory image.
fn open_image(image: Vec<u8>, options: &OpenOptions) -> Locator {
    let mut locator = Locator::new();
    locator.open_reader(Box::new(image), options).unwrap();
    locator
}
