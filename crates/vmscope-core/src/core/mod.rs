mod address;
mod info;
pub(crate) mod macros;
mod vcpu_id;

pub use self::{
    address::{Gfn, Pa, Va},
    info::VmiInfo,
    vcpu_id::VcpuId,
};
