//! Domain models: customers, products, enquiries, parsing records.

pub mod customer;
pub mod enquiry;
pub mod parsing;
pub mod product;

pub use customer::{Customer, CustomerPatch, Flag, NewCustomer};
pub use enquiry::{
    Enquiry, EnquiryChannel, EnquiryLine, EnquiryPatch, EnquiryStatus, NewEnquiry, Standards,
};
pub use parsing::{ParsingRecord, ParsingState};
pub use product::{ApprovalStatus, NewProduct, Product, ProductPatch, generate_cat_number};
