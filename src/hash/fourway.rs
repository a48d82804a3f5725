//! Four-lane Keccak-f[1600] for the short SHAKE-128 inputs of the
//! WOTS+ chain inner loops.
//!
//! Every PRF and F evaluation of a SHAKE-128 instance absorbs fewer
//! bytes than the SHAKE-128 rate, so a single permutation per lane
//! suffices.  Batching four independent evaluations amortises the
//! sponge bookkeeping; lanes without work stay idle instead of
//! producing spurious output.

use keccak::f1600;

pub(crate) const LANES: usize = 4;

/// SHAKE-128 rate in bytes.
const RATE: usize = 168;

/// Four independent Keccak-f[1600] states.
pub(crate) struct ShakeX4 {
    states: [[u64; 25]; LANES],
}

fn xor_byte(state: &mut [u64; 25], index: usize, byte: u8) {
    state[index / 8] ^= u64::from(byte) << (8 * (index % 8));
}

fn get_byte(state: &[u64; 25], index: usize) -> u8 {
    (state[index / 8] >> (8 * (index % 8))) as u8
}

impl ShakeX4 {
    pub fn new() -> ShakeX4 {
        ShakeX4 {
            states: [[0u64; 25]; LANES],
        }
    }

    /// Computes `SHAKE-128(inputs[i])` into `outputs[i]` for every lane
    /// whose input is present, using one permutation per lane.  Each
    /// input must be shorter than the SHAKE-128 rate and each output at
    /// most the rate.  A lane given `None` is left untouched.
    pub fn shake128(
        &mut self,
        inputs: [Option<&[u8]>; LANES],
        outputs: [Option<&mut [u8]>; LANES],
    ) {
        for (lane, (input, output)) in inputs.into_iter().zip(outputs).enumerate() {
            let (Some(input), Some(output)) = (input, output) else {
                continue;
            };
            debug_assert!(input.len() < RATE);
            debug_assert!(output.len() <= RATE);

            let state = &mut self.states[lane];
            *state = [0u64; 25];
            for (i, &b) in input.iter().enumerate() {
                xor_byte(state, i, b);
            }
            // SHAKE domain separator and the final bit of the padding.
            xor_byte(state, input.len(), 0x1f);
            xor_byte(state, RATE - 1, 0x80);
            f1600(state);
            for (i, b) in output.iter_mut().enumerate() {
                *b = get_byte(state, i);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha3::digest::{ExtendableOutput, Update, XofReader};
    use sha3::Shake128;

    fn shake128_reference(input: &[u8], out: &mut [u8]) {
        let mut h = Shake128::default();
        h.update(input);
        h.finalize_xof().read(out);
    }

    #[test]
    fn lanes_match_the_scalar_sponge() {
        let ins: Vec<Vec<u8>> = (0u8..4).map(|j| (0..96).map(|i| i ^ j).collect()).collect();
        let mut outs = [[0u8; 32]; 4];
        let mut x4 = ShakeX4::new();
        {
            let [o0, o1, o2, o3] = &mut outs;
            x4.shake128(
                [
                    Some(&ins[0]),
                    Some(&ins[1]),
                    Some(&ins[2]),
                    Some(&ins[3]),
                ],
                [
                    Some(&mut o0[..]),
                    Some(&mut o1[..]),
                    Some(&mut o2[..]),
                    Some(&mut o3[..]),
                ],
            );
        }
        for j in 0..4 {
            let mut expect = [0u8; 32];
            shake128_reference(&ins[j], &mut expect);
            assert_eq!(outs[j], expect, "lane {}", j);
        }
    }

    #[test]
    fn idle_lanes_are_left_untouched() {
        let input = [7u8; 48];
        let mut out0 = [0u8; 16];
        let mut out2 = [0xaau8; 16];
        let mut x4 = ShakeX4::new();
        x4.shake128(
            [Some(&input), None, None, None],
            [Some(&mut out0), None, Some(&mut out2), None],
        );
        let mut expect = [0u8; 16];
        shake128_reference(&input, &mut expect);
        assert_eq!(out0, expect);
        assert_eq!(out2, [0xaau8; 16]);
    }
}
